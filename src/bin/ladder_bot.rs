use grid_ladder::{runner::LadderRunner, strategy::PolicyRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file before settings so APP__* overrides apply
    dotenvy::dotenv().ok();

    // 1. Initialize Registry with the built-in presets
    let registry = PolicyRegistry::with_presets();

    // 2. Create Runner
    let args: Vec<String> = std::env::args().collect();
    let default_config = "config.toml".to_string();
    let config_path = args.get(1).unwrap_or(&default_config);
    if !std::path::Path::new(config_path).exists() {
        eprintln!(
            "Config file '{}' not found. Please create one.",
            config_path
        );
        eprintln!("Available presets: {}", registry.names().join(", "));
        std::process::exit(1);
    }

    let runner = LadderRunner::new(config_path, registry)?;

    // 3. Run
    match runner.run().await {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Err(e) => {
            eprintln!("Ladder execution error: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
