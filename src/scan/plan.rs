use serde::{Deserialize, Serialize};

use super::binarize::Binarizer;
use super::transform::Rotation;
use crate::ScanConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Normal,
    Inverted,
}

impl Polarity {
    pub const ALL: [Polarity; 2] = [Polarity::Normal, Polarity::Inverted];
}

/// One leaf of the transform search
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Attempt {
    pub scale: f32,
    pub region: f32,
    pub rotation: Rotation,
    pub binarizer: Binarizer,
    pub polarity: Polarity,
}

/// Ordered search space. Nesting, outermost first:
/// scale, region, rotation, binarizer, polarity.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPlan {
    pub scales: Vec<f32>,
    pub regions: Vec<f32>,
    pub rotations: Vec<Rotation>,
    pub binarizers: Vec<Binarizer>,
    pub polarities: Vec<Polarity>,
}

impl Default for SearchPlan {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}

impl SearchPlan {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            scales: config.scales.clone(),
            regions: config.regions.clone(),
            rotations: Rotation::ALL.to_vec(),
            binarizers: Binarizer::ALL.to_vec(),
            polarities: Polarity::ALL.to_vec(),
        }
    }

    /// Upper bound on leaves; readers that skip a rotation make the real count lower.
    pub fn len(&self) -> usize {
        self.scales.len()
            * self.regions.len()
            * self.rotations.len()
            * self.binarizers.len()
            * self.polarities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All leaves in search order
    pub fn attempts(&self) -> impl Iterator<Item = Attempt> + '_ {
        self.scales.iter().flat_map(move |&scale| {
            self.regions.iter().flat_map(move |&region| {
                self.rotations.iter().flat_map(move |&rotation| {
                    self.binarizers.iter().flat_map(move |&binarizer| {
                        self.polarities.iter().map(move |&polarity| Attempt {
                            scale,
                            region,
                            rotation,
                            binarizer,
                            polarity,
                        })
                    })
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_follow_nesting_order() {
        let plan = SearchPlan::default();
        let attempts: Vec<_> = plan.attempts().collect();
        assert_eq!(attempts.len(), plan.len());
        assert_eq!(attempts.len(), 3 * 3 * 4 * 2 * 2);

        let first = attempts[0];
        assert_eq!(first.scale, 1.0);
        assert_eq!(first.region, 1.0);
        assert_eq!(first.rotation, Rotation::Deg0);
        assert_eq!(first.binarizer, Binarizer::Hybrid);
        assert_eq!(first.polarity, Polarity::Normal);

        // innermost dimension varies fastest
        assert_eq!(attempts[1].polarity, Polarity::Inverted);
        assert_eq!(attempts[2].binarizer, Binarizer::Global);
        assert_eq!(attempts[4].rotation, Rotation::Deg90);
        assert_eq!(attempts[16].region, 0.6);
        assert_eq!(attempts[48].scale, 1.5);
    }
}
