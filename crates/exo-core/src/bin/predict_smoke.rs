use anyhow::Context;
use clap::Parser;
use exo_core::{Config, RawFeatures, TabularPredictor};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Load the artifacts under --model-dir and score one payload")]
struct Args {
    /// Directory holding classifier.json and, optionally, explainer.json.
    #[arg(long, default_value = "models")]
    model_dir: PathBuf,

    /// JSON object of raw features. Defaults to a hot-Jupiter-like candidate.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Print only the top-k weights.
    #[arg(long, default_value_t = 8)]
    topk: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let obj = match &args.input {
        Some(p) => {
            let s = std::fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
            serde_json::from_str::<serde_json::Value>(&s).context("parse input json")?
        }
        None => serde_json::json!({
            "pl_orbper": 10.5, "pl_orbsmax": 0.06, "pl_eqt": 1000, "pl_insol": 500,
            "pl_imppar": 0.55, "pl_trandep": 0.2, "pl_trandur": 4.0, "pl_ratdor": 15.0,
            "pl_ratror": 0.1, "st_teff": 5700, "st_rad": 1.0, "st_mass": 0.96,
            "st_met": -0.05, "st_logg": 4.45, "sy_imag": 14.2
        }),
    };
    let obj = obj.as_object().context("input must be a JSON object")?;
    let raw = RawFeatures::from_json_map(obj);
    println!("fields_present={}", raw.present_count());

    let cfg = Config {
        model_dir: args.model_dir,
        ..Config::from_env()
    };
    let predictor = TabularPredictor::new(cfg);
    predictor.ensure_loaded()?;
    println!(
        "explainer={}",
        if predictor.loader().explainer().is_some() { "loaded" } else { "none" }
    );

    let p = predictor.predict(&raw)?;
    println!("probability={:.6}", p.probability);
    println!("confidence={:.6}", p.confidence);
    println!("weights (top {}):", args.topk);
    for (name, w) in p.weights.iter().take(args.topk) {
        println!("  {:<12} {:>10.6}", name, w);
    }

    Ok(())
}
