//! Generador de nombres de app (`<adjetivo>-<sustantivo>`).
//!
//! La semilla (`NAME_SEED`, en hex) hace la secuencia reproducible entre
//! reinicios del proceso; sin semilla se usa entropía del sistema.
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::DomainError;

const ADJECTIVES: &[&str] = &["able", "amber", "bold", "brave", "bright", "calm", "clever", "cosmic", "crisp", "dapper",
                              "eager", "fancy", "gentle", "glad", "golden", "happy", "humble", "jolly", "keen", "lively",
                              "lucky", "mellow", "misty", "noble", "plucky", "proud", "quiet", "rapid", "shiny", "silent",
                              "sunny", "swift", "tidy", "vivid", "witty", "zesty"];

const NOUNS: &[&str] = &["anchor", "badger", "beacon", "breeze", "canyon", "cedar", "comet", "crane", "delta", "ember",
                         "falcon", "fjord", "glacier", "harbor", "heron", "island", "lagoon", "lantern", "maple",
                         "meadow", "nebula", "otter", "pebble", "pine", "quartz", "raven", "reef", "river", "sparrow",
                         "summit", "thicket", "tundra", "valley", "willow", "yarrow", "zephyr"];

pub struct NameGenerator {
    rng: Mutex<StdRng>,
}

impl NameGenerator {
    /// Semilla en hex (hasta 32 bytes; se rellena con ceros).
    pub fn from_hex_seed(seed: &str) -> Result<Self, DomainError> {
        let bytes = hex::decode(seed.trim()).map_err(|e| DomainError::validation("NAME_SEED", format!("invalid hex: {e}")))?;
        let mut buf = [0u8; 32];
        for (dst, src) in buf.iter_mut().zip(bytes.iter()) {
            *dst = *src;
        }
        Ok(Self { rng: Mutex::new(StdRng::from_seed(buf)) })
    }

    pub fn from_entropy() -> Self { Self { rng: Mutex::new(StdRng::from_entropy()) } }

    /// Próximo nombre candidato. `attempt > 0` añade un sufijo numérico para
    /// resolver colisiones.
    pub fn generate(&self, attempt: u32) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let adj = ADJECTIVES.choose(&mut *rng).copied().unwrap_or("app");
        let noun = NOUNS.choose(&mut *rng).copied().unwrap_or("app");
        if attempt == 0 {
            format!("{adj}-{noun}")
        } else {
            format!("{adj}-{noun}-{}", rng.gen_range(1..10_000u32))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate_app_name;

    #[test]
    fn same_seed_same_sequence() {
        let a = NameGenerator::from_hex_seed("deadbeef").unwrap();
        let b = NameGenerator::from_hex_seed("deadbeef").unwrap();
        for i in 0..5 {
            assert_eq!(a.generate(i), b.generate(i));
        }
    }

    #[test]
    fn generated_names_are_valid() {
        let g = NameGenerator::from_entropy();
        for i in 0..20 {
            let name = g.generate(i % 3);
            assert!(validate_app_name(&name).is_ok(), "{name}");
        }
    }

    #[test]
    fn bad_seed_is_rejected() { assert!(NameGenerator::from_hex_seed("xyz").is_err()); }
}
