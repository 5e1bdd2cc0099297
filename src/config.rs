use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "todo", version, about = "Daily to-do lists over HTTP")]
pub struct Config {
    /// Secret used to sign session cookies.
    #[arg(long, env = "SECRET", hide_env_values = true)]
    pub secret: String,

    /// SQLite database URL. Defaults to a file in the user's state directory.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Address to listen on.
    #[arg(long, env = "BIND", default_value = "127.0.0.1:5000")]
    pub bind: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.secret.trim().is_empty() {
            anyhow::bail!("SECRET must not be empty");
        }

        Ok(())
    }

    pub fn database_url(&self) -> anyhow::Result<String> {
        if let Some(url) = &self.database_url {
            return Ok(url.clone());
        }

        let db_file = default_data_dir()?.join("todo.db");
        Ok(format!("sqlite:{}?mode=rwc", db_file.display()))
    }
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    let config_dir = dirs::state_dir()
        .or_else(dirs::config_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
        .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;

    let db_path = config_dir.join("todo").join("data");
    std::fs::create_dir_all(&db_path)?;

    Ok(db_path)
}
