//! Trailing Shadow Demo
//!
//! A headless walk through the spring API:
//! - A bouncy "cursor" spring retargeted mid-flight
//! - Two linked shadow springs trailing it at an offset
//! - A value mapper turning positions into pixel columns
//!
//! Run with: RUST_LOG=spho_animation=debug cargo run -p spho_animation --example trailing_shadow

use spho_animation::{
    ConfigError, InitialPosition, Scheduler, Spring, SpringConfig, VirtualFrameHost,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const FRAME_MS: f64 = 16.0;
const WIDTH: usize = 60;

fn main() -> Result<(), ConfigError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let host = VirtualFrameHost::new();
    let scheduler = Scheduler::with_host(host.clone());

    let cursor = Spring::new(
        &scheduler,
        SpringConfig::bouncy(0.4, 1.2).with_overshooting(true),
        InitialPosition::new(0.0, 40.0),
    )?;
    let shadow = cursor.linked_spring_with(-4.0, SpringConfig::gentle())?;
    let trail = shadow.linked_spring_with(-4.0, SpringConfig::molasses())?;

    cursor.set_value_mapper(|x| x.round());
    let _ = cursor.on_at_rest(|column| info!(column, "cursor settled"));
    let _ = trail.on_end(|| info!("trail ended with its parents"));

    let mut frame = 0;
    while scheduler.has_active_animations() && frame < 400 {
        if frame == 20 {
            // Change direction while the cursor is still moving
            cursor.set_to_value(12.0);
        }
        host.step(FRAME_MS);
        if frame % 4 == 0 {
            println!("{}", render(&[&trail, &shadow, &cursor]));
        }
        frame += 1;
    }

    info!(
        frames = frame,
        cursor = cursor.current_value(),
        shadow = shadow.current_value(),
        trail = trail.current_value(),
        "all springs at rest"
    );

    cursor.end();
    Ok(())
}

fn render(springs: &[&Spring]) -> String {
    let mut row = vec![' '; WIDTH];
    for (glyph, spring) in ['.', 'o', '@'].iter().zip(springs) {
        let column = spring.current_value().round().clamp(0.0, (WIDTH - 1) as f64) as usize;
        row[column] = *glyph;
    }
    row.into_iter().collect()
}
