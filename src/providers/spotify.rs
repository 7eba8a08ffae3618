use crate::types::ProviderConfig;

const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";
const REDIRECT_URI: &str = "http://127.0.0.1:8989/login";

const SCOPES: [&str; 15] = [
    "user-read-playback-state",
    "user-read-currently-playing",
    "user-modify-playback-state",
    "playlist-read-private",
    "playlist-read-collaborative",
    "playlist-modify-public",
    "playlist-modify-private",
    "user-follow-read",
    "user-follow-modify",
    "user-top-read",
    "user-read-recently-played",
    "user-library-read",
    "user-library-modify",
    "user-read-private",
    "user-read-email",
];

pub fn config(client_id: String) -> ProviderConfig {
    ProviderConfig::new("spotify")
        .with_oauth(AUTHORIZE_URL, TOKEN_URL, REDIRECT_URI)
        .with_client_id(client_id)
        .with_scopes(SCOPES)
        .with_api_base(API_BASE)
        .with_probe("/me", None)
}
