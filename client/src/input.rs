//! Sources of locally authored movement for the own player

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::Vector3;

/// Produces the own player's next position each frame
pub trait MovementSource {
    fn step(&mut self, current: Vector3, dt: f32) -> Vector3;
}

/// Keeps the player where it is
#[derive(Debug, Default, Clone, Copy)]
pub struct Stationary;

impl MovementSource for Stationary {
    fn step(&mut self, current: Vector3, _dt: f32) -> Vector3 {
        current
    }
}

/// Random walk on the ground plane
///
/// The heading drifts a little every step, so the path curves instead of
/// jittering in place. Height is never changed.
pub struct Wanderer {
    rng: StdRng,
    speed: f32,
    heading: f32,
}

/// Largest heading change per second, in radians
const MAX_TURN_RATE: f32 = 2.0;

impl Wanderer {
    /// Creates a wanderer moving `speed` units per second; a seed makes the walk repeatable
    pub fn new(speed: f32, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let heading = rng.gen_range(0.0..std::f32::consts::TAU);

        Self {
            rng,
            speed,
            heading,
        }
    }
}

impl MovementSource for Wanderer {
    fn step(&mut self, current: Vector3, dt: f32) -> Vector3 {
        if dt <= 0.0 {
            return current;
        }

        let turn = MAX_TURN_RATE * dt;
        self.heading += self.rng.gen_range(-turn..=turn);

        let distance = self.speed * dt;
        Vector3::new(
            current.x + self.heading.cos() * distance,
            current.y,
            current.z + self.heading.sin() * distance,
        )
    }
}
