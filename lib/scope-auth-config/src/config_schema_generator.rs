use schemars::schema_for;
use scope_auth_config::ScopeAuthConfig;

fn main() {
    let schema = schema_for!(ScopeAuthConfig);

    match serde_json::to_string_pretty(&schema) {
        Ok(output) => println!("{}", output),
        Err(err) => {
            eprintln!("Failed to serialize the configuration schema: {}", err);
            std::process::exit(1);
        }
    }
}
