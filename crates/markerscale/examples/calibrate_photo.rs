use std::{env, path::PathBuf, time::Instant};

use image::ImageReader;
use markerscale::{calibrate, rgba_view, CalibrationConfig, NoTagDecoder};
#[cfg(not(feature = "tracing"))]
use markerscale::core::{filter_from_env, init_with_filter};
#[cfg(feature = "tracing")]
use markerscale::core::{init_tracing, TracingFormat};
#[cfg(feature = "tracing")]
use tracing_log::LogTracer;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let mut args = env::args().skip(1);
    let Some(first) = args.next() else {
        eprintln!("Usage: calibrate_photo <image_path | config.json>");
        return Ok(());
    };

    let config = if first.ends_with(".json") {
        CalibrationConfig::load_json(&first)?
    } else {
        CalibrationConfig {
            image_path: Some(first),
            ..CalibrationConfig::default()
        }
    };
    let Some(image_path) = config.image_path.clone() else {
        eprintln!("config has no image_path");
        return Ok(());
    };

    let img = ImageReader::open(&image_path)?.decode()?.to_rgba8();
    let started = Instant::now();
    let cal = calibrate(&rgba_view(&img)?, &config, NoTagDecoder)?;
    let elapsed = started.elapsed();

    match cal.outcome.result.as_ref() {
        Some(result) => println!(
            "{:?}: score {:.3}, {:.3} px/mm, quality {:.3} ({:.1} ms)",
            cal.outcome.state,
            result.score,
            result.pixels_per_unit,
            cal.quality(),
            elapsed.as_secs_f64() * 1000.0
        ),
        None => println!("no marker found ({:.1} ms)", elapsed.as_secs_f64() * 1000.0),
    }

    let output_path: PathBuf = config.output_path();
    cal.report().write_json(&output_path)?;
    println!("wrote report to {}", output_path.display());
    Ok(())
}

fn init_logging() {
    // Ignore errors if a logger/subscriber was already installed.
    #[cfg(feature = "tracing")]
    {
        let _ = LogTracer::init();
        let format = if env::var_os("MARKERSCALE_LOG_JSON").is_some() {
            TracingFormat::Json
        } else {
            TracingFormat::Pretty
        };
        init_tracing(format);
    }
    #[cfg(not(feature = "tracing"))]
    {
        let _ = init_with_filter(filter_from_env(log::LevelFilter::Info));
    }
}
