use glam::I64Vec3;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

const FACE_OFFSETS: [I64Vec3; 6] = [
    I64Vec3::new(-1, 0, 0),
    I64Vec3::new(1, 0, 0),
    I64Vec3::new(0, -1, 0),
    I64Vec3::new(0, 1, 0),
    I64Vec3::new(0, 0, -1),
    I64Vec3::new(0, 0, 1),
];

/// Symmetric neighbor offset set used for growing and boundary analysis.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Neighborhood {
    /// 6-connected, a diamond of radius 1.
    #[default]
    Face,
    /// 26-connected, the unit box without its center.
    Full,
}

impl Neighborhood {
    pub fn offsets(self) -> Vec<I64Vec3> {
        match self {
            Neighborhood::Face => FACE_OFFSETS.to_vec(),
            Neighborhood::Full => {
                let mut offsets = Vec::with_capacity(26);
                for z in -1..=1 {
                    for y in -1..=1 {
                        for x in -1..=1 {
                            if (x, y, z) != (0, 0, 0) {
                                offsets.push(I64Vec3::new(x, y, z));
                            }
                        }
                    }
                }
                offsets
            }
        }
    }
}
