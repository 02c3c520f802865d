//! MCP resources: the model catalog and observed costs.

use genmedia_core::{Catalog, CostTracker, ModelCategory};
use serde::{Deserialize, Serialize};

use crate::ResourceContent;

/// Scheme prefix of every resource URI.
pub const SCHEME: &str = "genmedia://";

/// MCP resource definition as listed by `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Resource URI.
    pub uri: String,
    /// Resource name.
    pub name: String,
    /// Resource description.
    pub description: String,
    /// MIME type.
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Resource URIs.
pub mod uri {
    use genmedia_core::ModelCategory;

    use super::SCHEME;

    /// Parse a resource URI.
    ///
    /// Supported formats:
    /// - `genmedia://models` - the whole catalog
    /// - `genmedia://models/{category}` - one category
    /// - `genmedia://costs` - observed cost statistics
    #[must_use]
    pub fn parse(uri: &str) -> Option<MediaUri> {
        let path = uri.strip_prefix(SCHEME)?;
        let parts: Vec<&str> = path.split('/').collect();

        match parts.as_slice() {
            ["models"] => Some(MediaUri::Models),
            ["models", category] => ModelCategory::parse(category).map(MediaUri::Category),
            ["costs"] => Some(MediaUri::Costs),
            _ => None,
        }
    }

    /// Parsed resource URI.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MediaUri {
        /// Every model.
        Models,
        /// Models of one category.
        Category(ModelCategory),
        /// Cost statistics.
        Costs,
    }
}

/// Read a resource.
///
/// # Errors
///
/// Returns a message naming the URI if it is not a known resource.
pub fn get_resource(
    uri: &str,
    catalog: &Catalog,
    costs: &CostTracker,
) -> Result<ResourceContent, String> {
    let parsed = uri::parse(uri).ok_or_else(|| format!("Resource not found: {uri}"))?;

    let content = match parsed {
        uri::MediaUri::Models => ResourceContent::Json(serde_json::json!({
            "models": catalog.models().collect::<Vec<_>>(),
        })),
        uri::MediaUri::Category(category) => ResourceContent::Json(serde_json::json!({
            "category": category.as_str(),
            "models": catalog.models_by_category(category),
        })),
        uri::MediaUri::Costs => ResourceContent::Json(serde_json::json!({
            "models": costs.snapshot(),
            "persisted_to": costs.path().map(|p| p.display().to_string()),
        })),
    };
    Ok(content)
}

/// List available resources.
#[must_use]
pub fn list_resources(catalog: &Catalog) -> Vec<Resource> {
    let mut resources = vec![Resource {
        uri: format!("{SCHEME}models"),
        name: "Model catalog".to_string(),
        description: format!("All {} generation models with parameters and prices", catalog.len()),
        mime_type: "application/json".to_string(),
    }];

    for category in ModelCategory::ALL {
        let count = catalog.models_by_category(category).len();
        if count == 0 {
            continue;
        }
        resources.push(Resource {
            uri: format!("{SCHEME}models/{category}"),
            name: format!("{category} models"),
            description: format!("{count} model(s) in the {category} category"),
            mime_type: "application/json".to_string(),
        });
    }

    resources.push(Resource {
        uri: format!("{SCHEME}costs"),
        name: "Observed costs".to_string(),
        description: "Running average, min and max credits per model".to_string(),
        mime_type: "application/json".to_string(),
    });
    resources
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uris_round_trip_through_the_listing() {
        let catalog = Catalog::builtin().unwrap();
        let costs = CostTracker::new();
        let listed = list_resources(&catalog);
        assert_eq!(listed.len(), ModelCategory::ALL.len() + 2);
        for resource in &listed {
            assert!(
                get_resource(&resource.uri, &catalog, &costs).is_ok(),
                "{}",
                resource.uri
            );
        }
    }

    #[test]
    fn category_resource_only_contains_that_category() {
        let catalog = Catalog::builtin().unwrap();
        let content =
            get_resource("genmedia://models/music", &catalog, &CostTracker::new()).unwrap();
        let ResourceContent::Json(json) = content else {
            panic!("expected json");
        };
        let models = json["models"].as_array().unwrap();
        assert!(!models.is_empty());
        assert!(models.iter().all(|m| m["category"] == "music"));
    }

    #[test]
    fn costs_resource_reflects_recorded_samples() {
        let catalog = Catalog::builtin().unwrap();
        let costs = CostTracker::new();
        costs.record("sdxl", 2.5);
        let content = get_resource("genmedia://costs", &catalog, &costs).unwrap();
        let ResourceContent::Json(json) = content else {
            panic!("expected json");
        };
        assert_eq!(json["models"]["sdxl"]["sample_count"], 1);
    }

    #[test]
    fn unknown_uris_are_rejected() {
        let catalog = Catalog::builtin().unwrap();
        let costs = CostTracker::new();
        for uri in ["other://models", "genmedia://models/3d", "genmedia://nope"] {
            assert!(get_resource(uri, &catalog, &costs).is_err(), "{uri}");
        }
    }
}
