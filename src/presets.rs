use glam::Vec2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::particle::Particle;
use crate::scene;

pub const DEFAULT_PRESET_ID: &str = "two-clusters";

/// Extent of the box used by the uniform scene.
const UNIFORM_WORLD_SIZE: f32 = 1000.0;

/// Which generator produces the initial particle array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SceneKind {
    TwoClusters,
    Galaxies,
    Uniform,
}

/// Scene settings; `seed == 0` picks a fresh seed per run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSettings {
    pub kind: SceneKind,
    pub count: u32,
    pub galaxy_count: u32,
    pub seed: u64,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            kind: SceneKind::TwoClusters,
            count: 2000,
            galaxy_count: 3,
            seed: 0,
        }
    }
}

impl SceneSettings {
    /// Run the configured generator.
    pub fn generate(&self) -> Vec<Particle> {
        let mut rng = if self.seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(self.seed)
        };

        match self.kind {
            SceneKind::TwoClusters => scene::two_clusters(self.count, &mut rng),
            SceneKind::Galaxies => scene::galaxies(self.count, self.galaxy_count, &mut rng),
            SceneKind::Uniform => scene::uniform_box(
                self.count,
                Vec2::ZERO,
                Vec2::splat(UNIFORM_WORLD_SIZE),
                &mut rng,
            ),
        }
    }
}

/// A named scene configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenePreset {
    pub name: String,
    pub scene: SceneSettings,
}

/// Metadata about a preset (for listing without full data).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PresetInfo {
    pub id: String,
    pub name: String,
}

/// Get list of available preset IDs and names.
pub fn get_preset_list() -> Vec<PresetInfo> {
    vec![
        PresetInfo {
            id: "two-clusters".to_string(),
            name: "Two Clusters".to_string(),
        },
        PresetInfo {
            id: "galaxies".to_string(),
            name: "Galaxies".to_string(),
        },
        PresetInfo {
            id: "uniform".to_string(),
            name: "Uniform Box".to_string(),
        },
    ]
}

/// Get a full preset by ID.
pub fn get_preset(id: &str) -> Option<ScenePreset> {
    match id {
        "two-clusters" => Some(ScenePreset {
            name: "Two Clusters".to_string(),
            scene: SceneSettings::default(),
        }),
        "galaxies" => Some(ScenePreset {
            name: "Galaxies".to_string(),
            scene: SceneSettings {
                kind: SceneKind::Galaxies,
                count: 3000,
                galaxy_count: 3,
                seed: 0,
            },
        }),
        "uniform" => Some(ScenePreset {
            name: "Uniform Box".to_string(),
            scene: SceneSettings {
                kind: SceneKind::Uniform,
                count: 1500,
                galaxy_count: 3,
                seed: 0,
            },
        }),
        _ => None,
    }
}

/// Convenience helper for retrieving the default preset.
pub fn get_default_preset() -> ScenePreset {
    get_preset(DEFAULT_PRESET_ID).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_preset_resolves() {
        for info in get_preset_list() {
            let preset = get_preset(&info.id);
            assert!(preset.is_some(), "preset {} missing", info.id);
            assert_eq!(preset.unwrap().name, info.name);
        }
    }

    #[test]
    fn unknown_preset_is_none() {
        assert!(get_preset("nope").is_none());
    }

    #[test]
    fn seeded_scenes_are_reproducible() {
        let settings = SceneSettings {
            seed: 7,
            count: 400,
            ..Default::default()
        };
        let a = settings.generate();
        let b = settings.generate();
        assert_eq!(a, b);
    }

    #[test]
    fn presets_generate_their_configured_counts() {
        for info in get_preset_list() {
            let mut preset = get_preset(&info.id).unwrap();
            preset.scene.seed = 1;
            let particles = preset.scene.generate();
            assert_eq!(particles.len() as u32, preset.scene.count);
        }
    }
}
