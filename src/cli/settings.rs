use crate::{config, error, info, success};

pub async fn settings(client_id: Option<String>) {
    if let Some(client_id) = client_id {
        match config::save_spotify_client_id(client_id.trim()).await {
            Ok(path) => success!("Saved Spotify client id to {}", path.display()),
            Err(e) => error!("Cannot save settings. Err: {}", e),
        }
        return;
    }

    info!("Config directory: {}", config::config_dir().display());
    info!("Credentials: {}", config::credentials_dir().display());
    match config::load_settings().await {
        Ok(settings) if settings.is_empty() => info!("No settings saved yet"),
        Ok(settings) => {
            for (key, value) in settings {
                println!("  {key} = {value}");
            }
        }
        Err(e) => error!("Cannot read {}. Err: {}", config::settings_path().display(), e),
    }
}
