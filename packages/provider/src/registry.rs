//! Provider registry — loads endpoint definitions from embedded TOML.
//!
//! Each `.toml` file in `packages/provider/providers/` is baked into the
//! binary at compile time via [`include_str!`]. Base URLs and tokens can be
//! overridden at runtime through the env vars named in each definition.

use std::sync::Arc;

use haze_map_poi_models::SourceId;

use crate::aqi_index::AqiIndexProvider;
use crate::poi_directory::PoiDirectoryProvider;
use crate::sensor_network::SensorNetworkProvider;
use crate::{PoiProvider, ProviderDefinition};

/// TOML endpoint definitions embedded at compile time.
const PROVIDER_TOMLS: &[(&str, &str)] = &[
    ("aqi_index", include_str!("../providers/aqi_index.toml")),
    (
        "sensor_network",
        include_str!("../providers/sensor_network.toml"),
    ),
    (
        "poi_directory",
        include_str!("../providers/poi_directory.toml"),
    ),
];

/// Returns all configured endpoint definitions, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_definitions() -> Vec<ProviderDefinition> {
    PROVIDER_TOMLS
        .iter()
        .map(|(name, raw)| {
            toml::from_str(raw).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Builds one adapter per configured upstream, sharing the given HTTP
/// client.
///
/// # Panics
///
/// Panics if any embedded TOML config is malformed.
#[must_use]
pub fn build_providers(client: &reqwest::Client) -> Vec<Arc<dyn PoiProvider>> {
    all_definitions()
        .iter()
        .map(|definition| match definition.id {
            SourceId::AqiIndex => {
                Arc::new(AqiIndexProvider::new(definition, client.clone())) as Arc<dyn PoiProvider>
            }
            SourceId::SensorNetwork => {
                Arc::new(SensorNetworkProvider::new(definition, client.clone()))
                    as Arc<dyn PoiProvider>
            }
            SourceId::PoiDirectory => {
                Arc::new(PoiDirectoryProvider::new(definition, client.clone()))
                    as Arc<dyn PoiProvider>
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use haze_map_poi_models::PoiCategory;

    #[test]
    fn loads_all_definitions() {
        let definitions = all_definitions();
        assert_eq!(definitions.len(), PROVIDER_TOMLS.len());
    }

    #[test]
    fn definition_ids_are_unique() {
        let definitions = all_definitions();
        let mut ids: Vec<SourceId> = definitions.iter().map(|d| d.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), definitions.len());
    }

    #[test]
    fn all_definitions_have_required_fields() {
        for definition in &all_definitions() {
            assert!(!definition.name.is_empty(), "{}: empty name", definition.id);
            assert!(
                definition.base_url.starts_with("http"),
                "{}: base_url is not a URL",
                definition.id
            );
        }
    }

    #[test]
    fn built_providers_cover_both_query_shapes() {
        let providers = build_providers(&reqwest::Client::new());
        assert_eq!(providers.len(), 3);

        let air: Vec<_> = providers
            .iter()
            .filter(|p| p.serves(Some(PoiCategory::AirQualityStation)))
            .collect();
        let facilities: Vec<_> = providers
            .iter()
            .filter(|p| p.serves(Some(PoiCategory::Hospital)))
            .collect();

        assert_eq!(air.len(), 2);
        assert_eq!(facilities.len(), 1);
        assert!(providers.iter().all(|p| p.serves(None)));
    }
}
