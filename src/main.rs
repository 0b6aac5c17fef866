use clap::{Arg, Command};
use log::LevelFilter;
use provider_detect::{Catalog, Category, DetectionContext, DetectionReport, ProviderDetector};
use std::process;

fn main() {
    let matches = Command::new("provider-detect")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Classify the hosting, DNS, email, registrar and certificate providers of a domain")
        .arg(
            Arg::new("catalog")
                .short('c')
                .long("catalog")
                .value_name("FILE")
                .help("Provider signature catalog (YAML); built-in catalog when omitted"),
        )
        .arg(
            Arg::new("generate-catalog")
                .long("generate-catalog")
                .value_name("FILE")
                .help("Write the built-in signature catalog to a file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-catalog")
                .long("test-catalog")
                .help("Validate the catalog and report patterns that can never match")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("context")
                .long("context")
                .value_name("FILE")
                .help("Detection context to classify (YAML or JSON)")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the detection report as JSON")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging with per-signature results")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-catalog") {
        generate_default_catalog(generate_path);
        return;
    }

    let catalog = match load_catalog(matches.get_one::<String>("catalog")) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("Error loading catalog: {e}");
            process::exit(1);
        }
    };

    if matches.get_flag("test-catalog") {
        test_catalog(&catalog);
        return;
    }

    let Some(context_path) = matches.get_one::<String>("context") else {
        eprintln!("Nothing to do: pass --context FILE, --test-catalog or --generate-catalog FILE");
        process::exit(2);
    };

    let context = match DetectionContext::from_file(context_path) {
        Ok(context) => context,
        Err(e) => {
            eprintln!("Error loading context '{context_path}': {e}");
            process::exit(1);
        }
    };

    let detector = match ProviderDetector::new(catalog) {
        Ok(detector) => detector,
        Err(e) => {
            eprintln!("Error building detector: {e}");
            process::exit(1);
        }
    };

    let report = detector.detect(&context);

    if matches.get_flag("json") {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing report: {e}");
                process::exit(1);
            }
        }
    } else {
        print_report(&report);
    }
}

fn load_catalog(path: Option<&String>) -> anyhow::Result<Catalog> {
    match path {
        Some(path) => {
            let catalog = Catalog::from_file(path)?;
            log::info!("Loaded signature catalog from '{path}'");
            Ok(catalog)
        }
        None => {
            log::debug!("No catalog given, using built-in signatures");
            Ok(Catalog::default())
        }
    }
}

fn generate_default_catalog(path: &str) {
    match Catalog::default().to_file(path) {
        Ok(()) => {
            println!("Default signature catalog written to: {path}");
        }
        Err(e) => {
            eprintln!("Error writing catalog file: {e}");
            process::exit(1);
        }
    }
}

fn test_catalog(catalog: &Catalog) {
    println!("🔍 Testing signature catalog...");
    println!();
    println!("Number of signatures: {}", catalog.len());
    for category in Category::ALL {
        println!(
            "  {:<12} {}",
            category.to_string(),
            catalog.by_category(category).count()
        );
    }

    if let Err(e) = catalog.validate() {
        println!("❌ Catalog validation failed:");
        println!("Error: {e}");
        process::exit(1);
    }

    let invalid = catalog.invalid_patterns();
    if invalid.is_empty() {
        println!("All regex patterns compiled successfully.");
    } else {
        println!("❌ {} pattern(s) can never match:", invalid.len());
        for pattern in &invalid {
            println!("  • {pattern}");
        }
        process::exit(1);
    }
}

fn print_report(report: &DetectionReport) {
    if report.is_empty() {
        println!("No known providers detected");
        return;
    }

    for category in Category::ALL {
        let names: Vec<&str> = report
            .for_category(category)
            .map(|d| d.name.as_str())
            .collect();
        if names.is_empty() {
            continue;
        }
        println!("{:<12} {}", category.to_string(), names.join(", "));
    }
}
