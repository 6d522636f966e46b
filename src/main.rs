//! Cable Evolve CLI - Run a structure search from JSON configuration.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use cable_evolve::{
    compute::{LocalRefiner, LogObserver, PopulationSearch, StructureModel, UniformFieldOracle},
    schema::{RefinerConfig, RunConfig},
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <run.json>", args[0]);
        eprintln!();
        eprintln!("Search for cable structures maximizing force per unit mass.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  run.json  Path to run configuration file");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);

    // Load configuration
    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: RunConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let search_config = &config.search;
    println!("Cable Structure Search");
    println!("======================");
    println!(
        "Structure: {} nodes, segment length [{}, {}]{}",
        search_config.structure.node_count,
        search_config.structure.segment_len_min,
        search_config.structure.segment_len_max,
        if search_config.structure.three_dimensional {
            ""
        } else {
            " (planar)"
        }
    );
    println!(
        "Population: {} (keep {}), generations: {}",
        search_config.population_size, search_config.keep_size, search_config.generations
    );
    println!(
        "Temperature: {} -> {}, current mode: {:?}",
        search_config.temp_start, search_config.temp_end, search_config.current_mode
    );
    println!();

    let oracle = UniformFieldOracle::new(config.oracle);
    let start = Instant::now();

    let mut search = PopulationSearch::new(config.search.clone(), oracle.clone())
        .unwrap_or_else(|e| {
            eprintln!("Error creating search: {}", e);
            std::process::exit(1);
        });

    println!("Running search...");
    let result = search.run_with_observer(&mut LogObserver).unwrap_or_else(|e| {
        eprintln!("Search failed: {}", e);
        std::process::exit(1);
    });

    println!();
    println!("Search result:");
    println!("  Generations: {} ({:?})", result.stats.generations, result.stats.stop_reason);
    println!("  Evaluations: {}", result.stats.total_evaluations);
    println!("  Best score: {:.6e}", result.best_score);
    print_structure(&result.best_structure);

    if let Some(refiner_config) = &config.refiner {
        let refined = refine(refiner_config, &result.best_structure, &oracle);
        println!();
        println!("Refinement:");
        println!(
            "  Iterations: {} ({:?}), evaluations: {}",
            refined.iterations, refined.stop_reason, refined.evaluations
        );
        println!("  Score: {:.6e}", refined.score);
        print_structure(&refined.structure);
    }

    println!();
    println!("Time: {:.2}s", start.elapsed().as_secs_f32());
}

fn refine(
    config: &RefinerConfig,
    structure: &StructureModel,
    oracle: &UniformFieldOracle,
) -> cable_evolve::compute::Refinement {
    let refiner = LocalRefiner::new(config.clone()).unwrap_or_else(|e| {
        eprintln!("Error creating refiner: {}", e);
        std::process::exit(1);
    });
    refiner
        .refine(structure, oracle, &mut LogObserver)
        .unwrap_or_else(|e| {
            eprintln!("Refinement failed: {}", e);
            std::process::exit(1);
        })
}

fn print_structure(structure: &StructureModel) {
    println!("  Mass: {:.3}", structure.mass());
    println!("  Envelope: {:.3}", structure.envelope());
    if let Some(perf) = structure.performance() {
        println!(
            "  Force: {:.6e} [{:.3e}, {:.3e}, {:.3e}]",
            perf.force, perf.force_vector[0], perf.force_vector[1], perf.force_vector[2]
        );
    }
}

fn print_example_config() {
    let config = RunConfig {
        refiner: Some(RefinerConfig::default()),
        ..Default::default()
    };

    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing example: {}", e);
            std::process::exit(1);
        }
    }
}
