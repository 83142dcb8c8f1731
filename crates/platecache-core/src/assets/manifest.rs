//! The application shell asset list and URL resolution.

use reqwest::Url;

use super::AssetError;

/// Files needed to render the app without a network connection.
const APP_SHELL: &[&str] = &[
    "/",
    "/index.html",
    "/restaurant.html",
    "/css/styles.css",
    "/js/dbhelper.js",
    "/js/main.js",
    "/js/restaurant_info.js",
    "/js/swRegister.js",
    "/data/restaurants.json",
    "/img/1.jpg",
    "/img/2.jpg",
    "/img/3.jpg",
    "/img/4.jpg",
    "/img/5.jpg",
    "/img/6.jpg",
    "/img/7.jpg",
    "/img/8.jpg",
    "/img/9.jpg",
    "/img/10.jpg",
    "https://fonts.googleapis.com/css?family=Roboto:300,400,500,700",
    "https://use.fontawesome.com/releases/v5.0.13/css/all.css",
];

pub fn default_manifest() -> Vec<String> {
    APP_SHELL.iter().map(|s| s.to_string()).collect()
}

pub fn parse_origin(origin: &str) -> Result<Url, AssetError> {
    Url::parse(origin).map_err(|e| AssetError::InvalidUrl {
        url: origin.to_string(),
        reason: e.to_string(),
    })
}

/// Resolve a manifest entry or request path against the site origin.
/// Absolute URLs are returned unchanged.
pub fn resolve(origin: &Url, entry: &str) -> Result<Url, AssetError> {
    origin.join(entry).map_err(|e| AssetError::InvalidUrl {
        url: entry.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_and_absolute() {
        let origin = parse_origin("http://localhost:8000").unwrap();
        assert_eq!(resolve(&origin, "/index.html").unwrap().as_str(), "http://localhost:8000/index.html");
        assert_eq!(resolve(&origin, "/").unwrap().as_str(), "http://localhost:8000/");
        let font = "https://fonts.googleapis.com/css?family=Roboto:300,400,500,700";
        assert_eq!(resolve(&origin, font).unwrap().as_str(), font);
    }

    #[test]
    fn test_invalid_origin() {
        assert!(matches!(parse_origin("not a url"), Err(AssetError::InvalidUrl { .. })));
    }

    #[test]
    fn test_default_manifest_covers_shell() {
        let manifest = default_manifest();
        assert_eq!(manifest.len(), 21);
        assert!(manifest.contains(&"/img/10.jpg".to_string()));
    }
}
