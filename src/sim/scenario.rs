//! 场景生成：目标点与初始位置
//!
//! 配置中给出 targets 时直接使用；否则在配置范围内用 seed 固定的 RNG 均匀采样，保证可复现。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ScenarioSection;
use crate::core::SwarmError;
use crate::swarm::geometry::is_finite;
use crate::swarm::Vec3;

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub targets: Vec<Vec3>,
    pub spawn: Vec<Vec3>,
}

type Range = (f64, f64);

fn check_range(name: &str, (lo, hi): Range) -> Result<(), SwarmError> {
    if lo.is_finite() && hi.is_finite() && lo <= hi {
        Ok(())
    } else {
        Err(SwarmError::InvalidScenario(format!(
            "{} range [{}, {}] is invalid",
            name, lo, hi
        )))
    }
}

fn sample(rng: &mut StdRng, n: usize, x: Range, y: Range, z: Range) -> Vec<Vec3> {
    (0..n)
        .map(|_| {
            [
                rng.gen_range(x.0..=x.1),
                rng.gen_range(y.0..=y.1),
                rng.gen_range(z.0..=z.1),
            ]
        })
        .collect()
}

pub fn build_scenario(cfg: &ScenarioSection) -> Result<Scenario, SwarmError> {
    if cfg.n_drones == 0 {
        return Err(SwarmError::InvalidScenario("n_drones must be > 0".into()));
    }
    for (name, r) in [
        ("target_x", cfg.target_x),
        ("target_y", cfg.target_y),
        ("target_z", cfg.target_z),
        ("spawn_x", cfg.spawn_x),
        ("spawn_y", cfg.spawn_y),
        ("spawn_z", cfg.spawn_z),
    ] {
        check_range(name, r)?;
    }

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let targets = if cfg.targets.is_empty() {
        sample(&mut rng, cfg.n_targets, cfg.target_x, cfg.target_y, cfg.target_z)
    } else {
        cfg.targets.clone()
    };
    if targets.is_empty() {
        return Err(SwarmError::InvalidScenario("no targets configured".into()));
    }
    if let Some(bad) = targets.iter().find(|t| !is_finite(t)) {
        return Err(SwarmError::InvalidScenario(format!("non-finite target {:?}", bad)));
    }
    let spawn = sample(&mut rng, cfg.n_drones, cfg.spawn_x, cfg.spawn_y, cfg.spawn_z);
    tracing::info!(
        n_drones = spawn.len(),
        n_targets = targets.len(),
        seed = cfg.seed,
        "Scenario built"
    );
    Ok(Scenario { targets, spawn })
}
