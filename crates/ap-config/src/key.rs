//! Deterministic config keys.
//!
//! A key is the SHA-256 of canonical JSON built from the *normalized* config,
//! prefixed with the artifact kind and a key-format version. Field order is
//! fixed by the structs, numbers are typed `f64`, and option order is removed
//! by normalization, so logically equal configs always collide and any field
//! change produces a different key.

use crate::overview::OverviewConfig;
use crate::pass1::Pass1Config;
use ap_common::{ArtifactKind, ConfigKey, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Bump when the key material layout changes.
const KEY_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct KeyMaterial<'a> {
    key_format: u32,
    kind: ArtifactKind,
    overview: &'a OverviewConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pass1: Option<&'a Pass1Config>,
}

/// Key of the overview artifact built from `cfg`.
pub fn overview_key(cfg: &OverviewConfig) -> Result<ConfigKey> {
    let overview = cfg.normalized()?;
    digest(&KeyMaterial {
        key_format: KEY_FORMAT_VERSION,
        kind: ArtifactKind::Overview,
        overview: &overview,
        pass1: None,
    })
}

/// Key of the pass-1 artifact derived from the overview built with
/// `overview_cfg`.
pub fn pass1_key(overview_cfg: &OverviewConfig, pass1_cfg: &Pass1Config) -> Result<ConfigKey> {
    let overview = overview_cfg.normalized()?;
    let pass1 = pass1_cfg.normalized()?;
    digest(&KeyMaterial {
        key_format: KEY_FORMAT_VERSION,
        kind: ArtifactKind::AutopsyPass1,
        overview: &overview,
        pass1: Some(&pass1),
    })
}

fn digest(material: &KeyMaterial<'_>) -> Result<ConfigKey> {
    let payload = serde_json::to_vec(material)?;
    let mut hasher = Sha256::new();
    hasher.update(&payload);
    Ok(ConfigKey::from_digest(&hasher.finalize().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ap_common::AggFunc;
    use proptest::prelude::*;

    fn base() -> OverviewConfig {
        OverviewConfig::for_signals(["signal_a", "signal_b"], 1.0)
    }

    #[test]
    fn test_equal_configs_collide() {
        assert_eq!(overview_key(&base()).unwrap(), overview_key(&base()).unwrap());
    }

    #[test]
    fn test_integer_and_float_hz_collide() {
        let from_json: OverviewConfig =
            serde_json::from_str(r#"{"signals": ["signal_a", "signal_b"], "hz": 1}"#).unwrap();
        assert_eq!(overview_key(&from_json).unwrap(), overview_key(&base()).unwrap());
    }

    #[test]
    fn test_option_order_ignored() {
        let reordered = OverviewConfig::for_signals(["signal_b", "signal_a"], 1.0).with_agg(vec![
            AggFunc::Max,
            AggFunc::Mean,
            AggFunc::Min,
        ]);
        assert_eq!(overview_key(&reordered).unwrap(), overview_key(&base()).unwrap());
    }

    #[test]
    fn test_each_field_changes_key() {
        let k0 = overview_key(&base()).unwrap();
        let variants = [
            OverviewConfig {
                hz: 2.0,
                ..base()
            },
            OverviewConfig::for_signals(["signal_a"], 1.0),
            base().with_agg(vec![AggFunc::Mean]),
            base().with_time_col(Some("t")),
            base().with_time_col(None),
            OverviewConfig {
                signals: None,
                ..base()
            },
        ];
        for v in variants {
            assert_ne!(overview_key(&v).unwrap(), k0, "{v:?}");
        }
    }

    #[test]
    fn test_pass1_key_depends_on_both_configs() {
        let p = Pass1Config::default();
        let k0 = pass1_key(&base(), &p).unwrap();
        assert_ne!(k0, overview_key(&base()).unwrap());

        let other_overview = OverviewConfig {
            hz: 0.5,
            ..base()
        };
        assert_ne!(pass1_key(&other_overview, &p).unwrap(), k0);

        let other_pass1 = Pass1Config {
            merge_gap_buckets: 1,
            ..p
        };
        assert_ne!(pass1_key(&base(), &other_pass1).unwrap(), k0);
    }

    #[test]
    fn test_invalid_config_has_no_key() {
        let bad = OverviewConfig {
            hz: 0.0,
            ..base()
        };
        assert!(overview_key(&bad).is_err());
    }

    proptest! {
        #[test]
        fn prop_distinct_hz_distinct_keys(a in 0.001f64..1000.0, b in 0.001f64..1000.0) {
            prop_assume!(a != b);
            let ka = overview_key(&OverviewConfig { hz: a, ..base() }).unwrap();
            let kb = overview_key(&OverviewConfig { hz: b, ..base() }).unwrap();
            prop_assert_ne!(ka, kb);
        }

        #[test]
        fn prop_signal_permutation_invariant(mut names in proptest::collection::vec("[a-z]{1,6}", 1..6)) {
            let forward = OverviewConfig::for_signals(names.clone(), 1.0).with_time_col(None);
            names.reverse();
            let backward = OverviewConfig::for_signals(names, 1.0).with_time_col(None);
            prop_assert_eq!(overview_key(&forward).unwrap(), overview_key(&backward).unwrap());
        }
    }
}
