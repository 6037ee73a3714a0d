use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, trace, warn};
use serde::Serialize;
use signal_common::SimulationConfig;
use signal_engine::Simulation;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

/// Diffusion + stochastic reaction simulation driven by a TOML config.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the simulation configuration
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    info!("Starting Signal Engine...");

    // --- Load Configuration ---
    let config = SimulationConfig::load(&args.config)?;

    // --- Initialize Simulation ---
    let mut sim = Simulation::new(config)?;
    let params = sim.params().clone();
    debug!("Simulation Parameters: {:#?}", params);

    if params.max_diffusion_number > 0.25 {
        warn!(
            "Diffusion number {:.3} exceeds 0.25; the explicit scheme is unstable. Reduce dt_s or refine the grid.",
            params.max_diffusion_number
        );
    }

    // --- Simulation Loop ---
    let total_steps = params.total_steps;
    let record_interval_steps = params.record_interval_steps;
    info!(
        "Recording snapshot every {} steps ({:.3} s).",
        record_interval_steps,
        record_interval_steps as f64 * params.dt
    );

    info!("Starting simulation loop for {} steps...", total_steps);
    let start_time = Instant::now();
    let mut previous_print_time = start_time;

    // --- Initial Snapshot (time = 0) ---
    if let Err(e) = sim.record_snapshot() {
        error!("Error recording initial snapshot: {}", e);
        anyhow::bail!("Failed to record initial snapshot.");
    }

    for step in 0..total_steps {
        let step_start_time = Instant::now();
        if let Err(e) = sim.step() {
            error!("Error during simulation step {}: {}", step + 1, e);
            anyhow::bail!("Simulation step failed.");
        }
        let step_duration = step_start_time.elapsed();

        // Print status periodically
        let current_time = Instant::now();
        let print_interval_secs = 5.0;
        let should_print_status = current_time.duration_since(previous_print_time).as_secs_f64() >= print_interval_secs;
        let is_record_step = (step + 1) % record_interval_steps == 0;
        let is_last_step = step == total_steps - 1;

        if should_print_status || is_record_step || is_last_step {
            info!(
                "Step [{}/{}] ({:.3} s) | Firings: {} | Step Time: {:6.2} ms | Elapsed: {:.2} s",
                step + 1,
                total_steps,
                sim.current_time(),
                sim.total_firings(),
                step_duration.as_secs_f64() * 1000.0,
                start_time.elapsed().as_secs_f64()
            );
            previous_print_time = current_time;

            if is_record_step || is_last_step {
                if let Err(e) = sim.record_snapshot() {
                    error!("Error recording snapshot at step {}: {}", step + 1, e);
                    anyhow::bail!("Failed to record snapshot.");
                }
            }
        } else {
            trace!(
                "Step [{}/{}] completed in {:.2} ms",
                step + 1,
                total_steps,
                step_duration.as_secs_f64() * 1000.0
            );
        }
    }
    sim.finish()?;

    let total_duration = start_time.elapsed();
    info!(
        "Simulation finished in {:.3} seconds ({} reactions fired).",
        total_duration.as_secs_f64(),
        sim.total_firings()
    );

    // --- Save Recorded Data ---
    let output = sim.config().output.clone();
    if output.save_stats {
        let format = output.format.as_deref().unwrap_or("json");
        if let Err(e) = save_snapshots(&output.base_filename, format, sim.get_recorded_snapshots()) {
            error!("Error saving snapshots: {:#}", e);
        }
    } else {
        info!("Skipping saving snapshots as per config (save_stats is false).");
    }

    if output.save_cell_counts {
        let filename = format!("{}_cell_counts.csv", output.base_filename);
        match save_cell_counts(&filename, &sim) {
            Ok(()) => info!("Final molecule counts saved to {}", filename),
            Err(e) => error!("Error saving CSV file '{}': {:#}", filename, e),
        }
    }

    info!("Simulation Complete.");
    Ok(())
}

/// Writes all snapshots as JSON, bincode or MessagePack. Unknown formats fall
/// back to JSON.
fn save_snapshots<T: Serialize>(base_filename: &str, format: &str, snapshots: &T) -> Result<()> {
    match format {
        "bincode" => {
            let filename = format!("{}_snapshots.bin", base_filename);
            let file = File::create(&filename).with_context(|| format!("creating '{}'", filename))?;
            let mut writer = BufWriter::new(file);
            bincode::serialize_into(&mut writer, snapshots)?;
            writer.flush()?;
            info!("All snapshots saved to {} (binary format)", filename);
        }
        "messagepack" => {
            let filename = format!("{}_snapshots.msgpack", base_filename);
            let file = File::create(&filename).with_context(|| format!("creating '{}'", filename))?;
            let mut writer = BufWriter::new(file);
            rmp_serde::encode::write(&mut writer, snapshots)?;
            writer.flush()?;
            info!("All snapshots saved to {} (MessagePack format)", filename);
        }
        other => {
            if other != "json" {
                error!("Unknown output format: {}. Using JSON instead.", other);
            }
            let filename = format!("{}_snapshots.json", base_filename);
            let json_string = serde_json::to_string(snapshots)?;
            let mut file = File::create(&filename).with_context(|| format!("creating '{}'", filename))?;
            file.write_all(json_string.as_bytes())?;
            info!("All snapshots saved to {} ({}MB)", filename, json_string.len() / 1_048_576);
        }
    }
    Ok(())
}

/// One row per (cell, molecule) with the final count.
fn save_cell_counts(filename: &str, sim: &Simulation) -> Result<()> {
    let mut writer = csv::Writer::from_path(filename)?;
    writer.write_record(["cell", "x_um", "y_um", "molecule", "count"])?;
    for cell in sim.cells() {
        for (molecule, count) in &cell.molecules {
            writer.write_record([
                cell.name.clone(),
                format!("{:.4}", cell.position.x),
                format!("{:.4}", cell.position.y),
                molecule.clone(),
                count.to_string(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}
