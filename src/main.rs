use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use ellipse_fusion::{BearingLocalizer, BearingObservation, ConfigurationManager, Ellipse, FusionEngine};

#[derive(Debug, Deserialize)]
struct ContributorsJson {
    contributors: Vec<Ellipse>,
}

#[derive(Debug, Deserialize)]
struct BearingsJson {
    observations: Vec<BearingObservation>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_manager(path: Option<&String>) -> Result<ConfigurationManager, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(ConfigurationManager::from_file(path)?),
        None => Ok(ConfigurationManager::new()),
    }
}

fn parse_contributors(json: &str) -> Result<Vec<Ellipse>, serde_json::Error> {
    serde_json::from_str::<ContributorsJson>(json).map(|parsed| parsed.contributors)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map_or("ellipse-fusion", |s| s.as_str());

    if args.len() == 3 && args[1] == "--bearings" {
        let json_data = std::fs::read_to_string(&args[2])?;
        let bearings: BearingsJson = serde_json::from_str(&json_data)?;
        let fix = BearingLocalizer::default().locate(&bearings.observations)?;
        println!("{}", serde_json::to_string_pretty(&fix)?);
        return Ok(());
    }

    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <contributors.json> [config.json]", program);
        eprintln!("   or: {} --bearings <observations.json>", program);
        return Err("Invalid arguments".into());
    }

    let manager = load_manager(args.get(2))?;
    let json_data = std::fs::read_to_string(&args[1])?;
    let contributors = parse_contributors(&json_data)?;

    let engine = FusionEngine::new(manager.config().clone());
    match engine.run(&contributors) {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error during fusion: {}", e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ellipse_fusion::{FusionConfig, FusionStatus};

    #[test]
    fn test_fusion_with_hardcoded_data() {
        let json_data = r#"
        {
          "contributors": [
            { "label": "site-a", "lat": 32.1234, "lon": 45.4767, "alt": 0.0,
              "sma": 1.5, "smi": 0.8, "orientation": 20.0 },
            { "label": "site-b", "lat": 32.1240, "lon": 45.4770, "alt": 0.0,
              "sma": 1.2, "smi": 0.9, "orientation": 110.0 },
            { "label": "site-c", "lat": 32.1237, "lon": 45.4760, "alt": 0.0,
              "sma": 2.0, "smi": 1.0, "orientation": 75.0 }
          ]
        }
        "#;
        let contributors = parse_contributors(json_data).unwrap();
        assert_eq!(contributors.len(), 3);

        let outcome = FusionEngine::new(FusionConfig::default()).run(&contributors).unwrap();
        assert_eq!(outcome.status, FusionStatus::Consistent);
        assert!((outcome.fused.lat - 32.1237).abs() < 0.001);
        assert!((outcome.fused.lon - 45.4766).abs() < 0.001);
        assert!(outcome.fused.sma < 1.5);

        let printed = serde_json::to_string_pretty(&outcome).unwrap();
        assert!(printed.contains("\"status\": \"consistent\""));
    }

    #[test]
    fn test_bearings_json() {
        let json_data = r#"
        {
          "observations": [
            { "lat": 0.0, "lon": 0.0, "alt": 0.0, "bearing": 0.0 },
            { "lat": 0.01, "lon": 0.01, "alt": 0.0, "bearing": 270.0, "sigma": 1.0 }
          ]
        }
        "#;
        let bearings: BearingsJson = serde_json::from_str(json_data).unwrap();
        let fix = BearingLocalizer::default().locate(&bearings.observations).unwrap();
        assert!((fix.position.x - 0.01).abs() < 1e-4);
    }
}
