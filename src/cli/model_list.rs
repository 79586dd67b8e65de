//! Model listing functionality

use std::error::Error;

use crate::core::catalog::select_model;
use crate::core::client::ApiClient;
use crate::core::config::Config;

pub async fn list_models(client: &ApiClient, config: &Config) -> Result<(), Box<dyn Error>> {
    let models = client.list_models().await?;

    println!("🤖 Available Models at {}", client.base_url());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    if models.is_empty() {
        println!("No models found.");
        return Ok(());
    }

    let selected = select_model(&models, config.default_model.as_deref())
        .map(|model| model.model_id.as_str());
    if let Some(default_model) = config.default_model.as_deref() {
        if selected != Some(default_model) {
            eprintln!("⚠️  Configured default-model '{default_model}' is not offered by this backend");
        }
    }

    for model in &models {
        let marker = if Some(model.model_id.as_str()) == selected {
            "→"
        } else {
            " "
        };
        let name = if model.model_name.is_empty() {
            model.model_id.as_str()
        } else {
            model.model_name.as_str()
        };
        let default = if model.default { " (backend default)" } else { "" };
        println!("{marker} {}  {name}{default}", model.model_id);
    }
    Ok(())
}
