//! `lca-frag`: traverse and score fragment models from the command line

mod model;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use lca_entity::Scenario;
use lca_traversal::{FragmentFlowView, Traversal};
use tracing_subscriber::EnvFilter;

use crate::model::{Model, Settings};

fn cli() -> Command {
    let model = Arg::new("model")
        .long("model")
        .short('m')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Model file (JSON)");
    let fragment = Arg::new("fragment")
        .long("fragment")
        .short('f')
        .required(true)
        .help("Fragment id or name");
    let scenario = Arg::new("scenario")
        .long("scenario")
        .short('s')
        .action(ArgAction::Append)
        .help("Scenario name; repeat to give candidates");
    let observed = Arg::new("observed")
        .long("observed")
        .action(ArgAction::SetTrue)
        .help("Prefer observed exchange values");
    let json = Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Output as JSON");

    Command::new("lca-frag")
        .version(lca_traversal::VERSION)
        .about("Fragment traversal and LCIA scoring")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Settings file (TOML)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("traverse")
                .about("List the traversal records of a fragment")
                .arg(model.clone())
                .arg(fragment.clone())
                .arg(scenario.clone())
                .arg(observed.clone())
                .arg(json.clone())
                .arg(
                    Arg::new("value")
                        .long("value")
                        .value_parser(value_parser!(f64))
                        .help("Explicit reference exchange value"),
                ),
        )
        .subcommand(
            Command::new("lcia")
                .about("Score a fragment in one quantity")
                .arg(model.clone())
                .arg(fragment.clone())
                .arg(scenario.clone())
                .arg(json.clone())
                .arg(
                    Arg::new("quantity")
                        .long("quantity")
                        .short('q')
                        .required(true)
                        .help("Quantity external reference"),
                )
                .arg(
                    Arg::new("flatten")
                        .long("flatten")
                        .action(ArgAction::SetTrue)
                        .help("Flatten nested scores into elementary flows"),
                ),
        )
        .subcommand(
            Command::new("cutoffs")
                .about("List the net boundary flows of a fragment")
                .arg(model.clone())
                .arg(fragment)
                .arg(scenario)
                .arg(observed)
                .arg(json.clone()),
        )
        .subcommand(
            Command::new("check")
                .about("Validate the sub-fragment graph of a model")
                .arg(model)
                .arg(json),
        )
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("log-json"));
    match run(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(matches: &ArgMatches) -> Result<()> {
    let settings = Settings::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    let Some((command, args)) = matches.subcommand() else {
        return Ok(());
    };
    let path = args.get_one::<PathBuf>("model").context("missing --model")?;
    let model = Model::load(path)?;
    let traversal = Traversal::new(&model.store, &model.quantities)
        .with_background(&model.background)
        .with_config(settings.traversal);
    tracing::debug!(command, config = ?traversal.config(), "running");

    match command {
        "traverse" => traverse(&model, &traversal, args),
        "lcia" => lcia(&model, &traversal, args),
        "cutoffs" => cutoffs(&model, &traversal, args),
        "check" => check(&model, args),
        other => anyhow::bail!("unknown command {other}"),
    }
}

fn scenario(args: &ArgMatches) -> Scenario {
    Scenario::from_names(args.get_many::<String>("scenario").into_iter().flatten().cloned())
}

fn fragment_arg(model: &Model, args: &ArgMatches) -> Result<lca_entity::FragmentId> {
    let key = args.get_one::<String>("fragment").context("missing --fragment")?;
    model.fragment(key)
}

fn traverse(model: &Model, traversal: &Traversal<'_>, args: &ArgMatches) -> Result<()> {
    let fragment = fragment_arg(model, args)?;
    let scenario = scenario(args);
    let observed = args.get_flag("observed");
    let records = match args.get_one::<f64>("value") {
        Some(value) => traversal.traverse_with_value(fragment, &scenario, observed, *value),
        None => traversal.traverse(fragment, &scenario, observed),
    }
    .with_context(|| format!("traversing {fragment} under {scenario}"))?;
    let views: Vec<_> = records.iter().map(lca_traversal::FragmentFlow::view).collect();

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }
    println!("{:>14} {:>14}  {:<11} {:<6}  name", "magnitude", "node weight", "termination", "dir");
    for view in &views {
        print_view(view, 0);
    }
    Ok(())
}

fn print_view(view: &FragmentFlowView, depth: usize) {
    println!(
        "{:>14.6} {:>14.6}  {:<11} {:<6}  {}{}",
        view.magnitude,
        view.node_weight,
        view.termination.to_string(),
        view.direction.to_string(),
        "  ".repeat(depth),
        view.name
    );
    for nested in &view.subfragments {
        print_view(nested, depth + 1);
    }
}

fn lcia(model: &Model, traversal: &Traversal<'_>, args: &ArgMatches) -> Result<()> {
    let fragment = fragment_arg(model, args)?;
    let quantity = model.quantity(args.get_one::<String>("quantity").context("missing --quantity")?)?;
    let scenario = scenario(args);
    let mut result = traversal
        .fragment_lcia(fragment, &quantity, &scenario)
        .with_context(|| format!("scoring {fragment} in {}", quantity.external_ref()))?;
    if args.get_flag("flatten") {
        result = traversal.flatten(&result)?;
    }

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    for component in result.components() {
        let id = component.entity().id();
        let score = result.component_result(id).unwrap_or_default();
        println!("{score:>16.6e}  {}", component.entity().label());
    }
    println!("{:>16.6e}  total [{}]", result.total(), quantity.unit());
    Ok(())
}

fn cutoffs(model: &Model, traversal: &Traversal<'_>, args: &ArgMatches) -> Result<()> {
    let fragment = fragment_arg(model, args)?;
    let scenario = scenario(args);
    let flows = traversal.cutoff_flows(fragment, &scenario, args.get_flag("observed"))?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&flows)?);
        return Ok(());
    }
    for io in &flows {
        println!(
            "{:<6} {:>14.6} {:<6} {}",
            io.direction.to_string(),
            io.magnitude,
            io.flow.reference_quantity().unit(),
            io.flow.name()
        );
    }
    Ok(())
}

fn check(model: &Model, args: &ArgMatches) -> Result<()> {
    let order = model.store.dependency_order()?;
    if args.get_flag("json") {
        let models: Vec<_> = order
            .iter()
            .filter_map(|id| model.store.get(*id).ok())
            .map(|f| serde_json::json!({ "id": f.id(), "name": f.name() }))
            .collect();
        let report = serde_json::json!({ "fragments": model.store.len(), "models": models });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("{} fragments, {} models, no sub-fragment cycles", model.store.len(), order.len());
    for id in order {
        let fragment = model.store.get(id)?;
        println!("  {} {}", id.short(), fragment.name());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::bike_file;

    fn run_args(args: &[&str]) -> Result<()> {
        let matches = cli().try_get_matches_from(args)?;
        run(&matches)
    }

    #[test]
    fn test_cli_definition() {
        cli().debug_assert();
    }

    #[test]
    fn test_subcommands_run() {
        let file = bike_file();
        let path = file.path().to_str().unwrap();
        run_args(&["lca-frag", "traverse", "-m", path, "-f", "frame"]).unwrap();
        run_args(&["lca-frag", "traverse", "-m", path, "-f", "frame", "-s", "lean", "--json"]).unwrap();
        run_args(&["lca-frag", "lcia", "-m", path, "-f", "frame", "-q", "gwp", "--flatten"]).unwrap();
        run_args(&["lca-frag", "cutoffs", "-m", path, "-f", "frame"]).unwrap();
        run_args(&["lca-frag", "check", "-m", path, "--json"]).unwrap();
    }

    #[test]
    fn test_unknown_fragment_fails() {
        let file = bike_file();
        let path = file.path().to_str().unwrap();
        let err = run_args(&["lca-frag", "traverse", "-m", path, "-f", "wheel"]).unwrap_err();
        assert!(err.to_string().contains("wheel"));
    }
}
