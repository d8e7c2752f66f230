use std::path::PathBuf;
use std::sync::Arc;

use lock_resolver::event::LogRecorder;
use lock_resolver::fetcher::RegistryFetcher;
use lock_resolver::materializer::FilePackageCreator;
use lock_resolver::store::FileLockStore;
use lock_resolver::dependency_graph::NodeData;
use lock_resolver::{Controller, Dag, DependencyGraph, LockStore, Reconciler, ReconcilerBuilder, ResolverConfig};

const USAGE: &str = "Usage:
    lock-resolver [options] reconcile <lock-dir> <package-dir> <lock>
    lock-resolver [options] run <lock-dir> <package-dir> [<lock>...]
    lock-resolver [options] graph <lock-dir> <lock> [<package>]";

#[tokio::main]
async fn main() {
	let mut opts;

	/* Parse console input */
	let parsed_options = {
		let args: Vec<String> = std::env::args().collect();

		opts = getopts::Options::new();
		opts.optflag( "h", "help",       "Show help");
		opts.optflag( "v", "verbose",    "Increased verbosity");
		opts.optopt(  "c", "config",     "Read configuration from this file", "PATH");
		opts.parsing_style(getopts::ParsingStyle::FloatingFrees);

		let parsed_options = match opts.parse(&args[1..]) {
			Ok(m)  => { m }
			Err(e) => { println!("Unable to parse options: {}", e); return }
		};

		if parsed_options.opt_present("h") {
			eprintln!("{}", opts.usage(USAGE));
			return;
		}

		parsed_options
	};

	let mut logger = env_logger::Builder::from_default_env();
	if parsed_options.opt_present("v") {
		logger.filter_level(log::LevelFilter::Debug);
	}
	logger.init();

	let config = match parsed_options.opt_str("c") {
		Some(path) => ResolverConfig::load_from_path(&path),
		None => ResolverConfig::load_from_disk(),
	}.unwrap_or_else(|e| {
		log::warn!("Failed to read config file: {}", e);
		log::warn!("Using default config.");
		ResolverConfig::default()
	});

	let result = match parsed_options.free.first().map(String::as_str) {
		Some("reconcile") => reconcile(&config, &parsed_options.free[1..]).await,
		Some("run") => run(&config, &parsed_options.free[1..]).await,
		Some("graph") => graph(&config, &parsed_options.free[1..]).await,
		Some(other) => Err(Error::UnknownCommand(other.to_string())),
		None => { eprintln!("{}", opts.usage(USAGE)); return },
	};

	if let Err(e) = result {
		log::error!("{}", e);
		std::process::exit(1);
	}
}

fn argument<'a>(args: &'a [String], i: usize, name: &'static str) -> Result<&'a str, Error> {
	args.get(i).map(String::as_str).ok_or(Error::MissingArgument(name))
}

fn build_reconciler(config: &ResolverConfig, store: Arc<FileLockStore>, package_dir: PathBuf) -> Reconciler {
	let fetcher = RegistryFetcher::new(reqwest::Client::new(), config.https_only());
	ReconcilerBuilder::new(store, Arc::new(FilePackageCreator::new(package_dir)))
		.fetcher(Arc::new(fetcher))
		.recorder(Arc::new(LogRecorder))
		.config(config.clone())
		.build()
}

/// Runs a single pass and reports where it stopped.
async fn reconcile(config: &ResolverConfig, args: &[String]) -> Result<(), Error> {
	let lock_dir = argument(args, 0, "lock directory")?;
	let package_dir = argument(args, 1, "package directory")?;
	let name = argument(args, 2, "lock name")?;

	let store = Arc::new(FileLockStore::new(lock_dir));
	let reconciler = build_reconciler(config, store, PathBuf::from(package_dir));

	let outcome = reconciler.reconcile(name).await.map_err(lock_resolver::Error::from)?;
	println!("{:?}", outcome.state);
	if let Some(after) = outcome.requeue_after {
		println!("Retry in {:?}", after);
	}
	Ok(())
}

/// Reconciles locks until interrupted. With no lock names every lock in the directory is used.
async fn run(config: &ResolverConfig, args: &[String]) -> Result<(), Error> {
	let lock_dir = argument(args, 0, "lock directory")?;
	let package_dir = argument(args, 1, "package directory")?;

	let store = Arc::new(FileLockStore::new(lock_dir));
	let names = if args.len() > 2 {
		args[2..].to_vec()
	} else {
		store.list().await.map_err(lock_resolver::Error::from)?
	};
	if names.is_empty() {
		log::warn!("No locks found in {}", lock_dir);
		return Ok(());
	}

	let reconciler = build_reconciler(config, store, PathBuf::from(package_dir));
	let controller = Controller::new(Arc::new(reconciler), config);

	let (tx, rx) = tokio::sync::watch::channel(false);
	tokio::spawn(async move {
		if let Err(e) = tokio::signal::ctrl_c().await {
			log::error!("Unable to listen for interrupt: {}", e);
		}
		log::info!("Shutting down.");
		let _ = tx.send(true);
	});

	log::info!("Reconciling {} lock(s)", names.len());
	controller.run(names, rx).await;
	Ok(())
}

/// Prints the dependency graph of a lock without changing anything.
///
/// With a package only that package's requirements and what they pull in are shown.
async fn graph(_config: &ResolverConfig, args: &[String]) -> Result<(), Error> {
	let lock_dir = argument(args, 0, "lock directory")?;
	let name = argument(args, 1, "lock name")?;

	let lock = FileLockStore::new(lock_dir).get(name).await.map_err(lock_resolver::Error::from)?;

	let mut graph = DependencyGraph::new();
	let implied = graph.init(&lock.packages).map_err(lock_resolver::Error::from)?;

	if let Some(package) = args.get(2) {
		if !graph.contains(package) {
			return Err(Error::UnknownPackage(package.clone()));
		}
		print_requirements(&graph, package);
		println!("\tpulls in [{}]", graph.trace(package).unwrap_or_default().join(", "));
		return Ok(());
	}

	println!("Lock {} (revision {}): {} installed, {} missing", lock.name, lock.revision, lock.packages.len(), implied.len());
	for package in &lock.packages {
		print_requirements(&graph, package.identifier());
	}

	println!("Missing:");
	for dependency in &implied {
		println!("\t{} {} ({})", dependency.identifier(), dependency.constraints, dependency.package_type);
	}

	match graph.sort() {
		Ok(order) => println!("Install order: {}", order.join(", ")),
		Err(e) => println!("Cannot order packages: {}", e),
	}
	Ok(())
}

fn print_requirements(graph: &DependencyGraph, identifier: &str) {
	let version = match graph.node(identifier) {
		Some(NodeData::Installed(p)) => p.version.as_str(),
		_ => "(not installed)",
	};
	println!("\t{} {}", identifier, version);
	for (target, edge) in graph.edges(identifier).unwrap_or_default() {
		println!("\t\trequires {} {}", target, edge.constraints);
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("lock-resolver error: {0}")]
	Resolver(#[from] lock_resolver::Error),
	#[error("Missing argument: {0}")]
	MissingArgument(&'static str),
	#[error("Unknown command `{0}`")]
	UnknownCommand(String),
	#[error("Package `{0}` is not in the lock")]
	UnknownPackage(String),
}
