use std::io::Write;
use std::path::PathBuf;

use log::debug;
use tokio::runtime::Builder;

use laces::bean::ProfileNode;
use laces::engine::{EngineContext, NoOpEngine};
use laces::session::{self, RunningSession};
use laces::store::{self, MemoryProfileStore};

fn print_usage_and_exit(arg0: String) {
    eprintln!(
        "Usage: {arg0} [--threads/-t N] [--dry-run/-d] [--cache-dir DIR] [--worker-dir DIR] <profile filename>"
    );
    eprintln!("       {arg0} import <share uri>");
    std::process::exit(1);
}

fn main() {
    env_logger::builder()
        .format(|buf, record| {
            let timestamp = buf.timestamp();
            let level_style = buf.default_level_style(record.level());
            let sanitized_args = format!("{}", record.args())
                .chars()
                .map(|c| {
                    if c.is_ascii_graphic() || c == ' ' {
                        c
                    } else {
                        '?'
                    }
                })
                .collect::<String>();

            writeln!(
                buf,
                "[{} {level_style}{}{level_style:#} {}] {}",
                timestamp,
                record.level(),
                record.target(),
                sanitized_args
            )
        })
        .init();

    let mut args: Vec<String> = std::env::args().collect();
    let arg0 = args.remove(0);
    let mut num_threads = 0usize;
    let mut dry_run = false;
    let mut cache_dir: Option<PathBuf> = None;
    let mut worker_dir: Option<PathBuf> = None;

    while !args.is_empty() && args[0].starts_with('-') {
        if args[0] == "--threads" || args[0] == "-t" {
            args.remove(0);
            if args.is_empty() {
                eprintln!("Missing threads argument.");
                print_usage_and_exit(arg0);
                return;
            }
            num_threads = match args.remove(0).parse::<usize>() {
                Ok(n) => n,
                Err(e) => {
                    eprintln!("Invalid thread count: {e}");
                    print_usage_and_exit(arg0);
                    return;
                }
            };
        } else if args[0] == "--dry-run" || args[0] == "-d" {
            args.remove(0);
            dry_run = true;
        } else if args[0] == "--cache-dir" {
            args.remove(0);
            if args.is_empty() {
                eprintln!("Missing cache dir argument.");
                print_usage_and_exit(arg0);
                return;
            }
            cache_dir = Some(PathBuf::from(args.remove(0)));
        } else if args[0] == "--worker-dir" {
            args.remove(0);
            if args.is_empty() {
                eprintln!("Missing worker dir argument.");
                print_usage_and_exit(arg0);
                return;
            }
            worker_dir = Some(PathBuf::from(args.remove(0)));
        } else {
            eprintln!("Invalid argument: {}", args[0]);
            print_usage_and_exit(arg0);
            return;
        }
    }

    if !args.is_empty() && args[0] == "import" {
        let link = match args.get(1) {
            Some(link) => link,
            None => {
                eprintln!("Usage: {arg0} import <share uri>");
                std::process::exit(1);
            }
        };
        match laces::link::parse_link(link) {
            Ok(parsed) => {
                let node = ProfileNode {
                    id: 1,
                    name: parsed.name,
                    bean: parsed.bean,
                };
                match serde_yaml::to_string(&node) {
                    Ok(yaml) => println!("{yaml}"),
                    Err(e) => {
                        eprintln!("Could not serialize profile: {e}");
                        std::process::exit(1);
                    }
                }
            }
            Err(e) => {
                eprintln!("Failed to import link: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let profile_path = match args.first() {
        Some(path) => path.clone(),
        None => {
            println!("No profile file specified, assuming profiles.laces.yaml");
            "profiles.laces.yaml".to_string()
        }
    };

    if num_threads == 0 {
        num_threads = std::cmp::max(
            2,
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        );
        debug!("Runtime threads: {num_threads}");
    } else {
        println!("Using custom thread count ({num_threads})");
    }

    let mut builder = if num_threads == 1 {
        Builder::new_current_thread()
    } else {
        let mut mt = Builder::new_multi_thread();
        mt.worker_threads(num_threads);
        mt
    };

    let runtime = builder
        .enable_io()
        .enable_time()
        .build()
        .expect("Could not build tokio runtime");

    runtime.block_on(async move {
        let profile_file = match store::load_profile_file(&profile_path).await {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Failed to load profile file: {e}\n");
                print_usage_and_exit(arg0);
                return;
            }
        };

        let mut options = profile_file.options.clone();
        if let Some(cache_dir) = cache_dir {
            options.cache_dir = cache_dir;
        }
        if let Some(worker_dir) = worker_dir {
            options.worker_dir = Some(worker_dir);
        }

        let root = profile_file
            .selected_node()
            .expect("selection validated at load")
            .clone();
        let store = MemoryProfileStore::from_nodes(profile_file.profiles);

        if dry_run {
            println!("Starting dry run.");
            match session::dry_run(&store, &root, &options) {
                Ok(result) => {
                    for summary in result.hop_summaries.iter() {
                        println!("{summary}");
                    }
                    match result.engine_config.to_json() {
                        Ok(bytes) => {
                            println!("{}", String::from_utf8_lossy(&bytes));
                        }
                        Err(e) => {
                            eprintln!("Could not serialize engine config: {e}");
                        }
                    }
                    println!("Finishing dry run, profile compiled successfully.");
                }
                Err(e) => {
                    eprintln!("Dry run failed: {e}\n");
                    std::process::exit(1);
                }
            }
            return;
        }

        println!("\nStarting session for {}..", root.label());

        let mut session = match RunningSession::start(
            &store,
            &root,
            &options,
            Box::new(NoOpEngine::new()),
            EngineContext::default(),
        )
        .await
        {
            Ok(session) => session,
            Err(e) => {
                eprintln!("Failed to start session: {e}");
                std::process::exit(1);
            }
        };

        println!("Session running. Press ctrl-c to stop.");

        tokio::select! {
            fatal = session.next_fatal() => {
                if let Some(fatal) = fatal {
                    eprintln!("Session failed: {}", fatal.reason);
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    eprintln!("Could not wait for ctrl-c: {e}");
                }
                println!("Stopping session..");
            }
        }

        session.stop().await;
    });
}
