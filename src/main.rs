use clap::Parser;
use colored::*;
use nginx_steward::cli::{AnalyzeArgs, BackendArgs, Cli, ColorChoice, Commands, MutateArgs, ParseArgs, TargetArgs};
use nginx_steward::config::{HostProfile, StewardConfig};
use nginx_steward::parsers::{parse_with_fallback, ConfigParser, NginxParser, ParseStatus};
use nginx_steward::workflow::{MutationWorkflow, Outcome};
use nginx_steward::{analyze_remote, health, report, validate_structure, MemoryShell, RemoteShell, SshChannel};
use std::fs;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    let cli = Cli::parse();

    match cli.color {
        ColorChoice::Always => colored::control::set_override(true),
        ColorChoice::Never => colored::control::set_override(false),
        ColorChoice::Auto => {}
    }

    init_logging(cli.verbose, cli.quiet);

    let result = StewardConfig::load_or_default(cli.config.as_deref())
        .map_err(|e| e.to_string())
        .and_then(|config| match cli.command {
            Commands::Analyze(args) => run_analyze(&config, args, cli.quiet),
            Commands::Validate(args) => run_validate(&config, args),
            Commands::Create(args) => run_mutation(&config, args, Mutation::Create),
            Commands::Update(args) => run_mutation(&config, args, Mutation::Update),
            Commands::SetBackend(args) => run_set_backend(&config, args),
            Commands::Status(args) => run_status(&config, args),
            Commands::Parse(args) => run_parse(args),
        });

    if let Err(e) = result {
        eprintln!("{}: {}", "error".red().bold(), e);
        process::exit(1);
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| format!("nginx_steward={}", level).into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

/// Connected shell for a target: SSH, or a local tree when `--from-dir` is set
fn open_shell(
    config: &StewardConfig,
    target: &TargetArgs,
    from_dir: Option<&std::path::Path>,
) -> Result<(HostProfile, Box<dyn RemoteShell>), String> {
    if let Some(dir) = from_dir {
        let profile = HostProfile {
            name: "local".to_string(),
            host: dir.display().to_string(),
            main_config: target.main_config.clone(),
            ..Default::default()
        };
        let shell: Box<dyn RemoteShell> = Box::new(
            MemoryShell::load_tree(dir).map_err(|e| format!("Failed to read {}: {}", dir.display(), e))?,
        );
        return Ok((profile, shell));
    }

    let profile = target.resolve(config).map_err(|e| e.to_string())?;
    let channel: Box<dyn RemoteShell> =
        Box::new(nginx_steward::connect(profile.credentials()).map_err(|e| e.to_string())?);
    Ok((profile, channel))
}

fn run_analyze(config: &StewardConfig, args: AnalyzeArgs, quiet: bool) -> Result<(), String> {
    let (profile, mut shell) = open_shell(config, &args.target, args.from_dir.as_deref())?;
    let main_config = config.main_config_for(&profile).to_string();
    let mirror_dir = args.mirror_dir.clone().unwrap_or_else(|| config.mirror_dir().join(&profile.name));

    let result = analyze_remote(shell.as_mut(), &main_config, &mirror_dir).map_err(|e| e.to_string());
    shell.close();
    let result = result?;

    if args.json {
        let json = serde_json::to_string_pretty(&result).map_err(|e| e.to_string())?;
        println!("{}", json);
        return Ok(());
    }

    if !quiet {
        println!("{}: {}", "Analyzing".cyan().bold(), profile.name);
    }
    print!("{}", report::render_analysis(&result));
    Ok(())
}

fn run_validate(config: &StewardConfig, args: AnalyzeArgs) -> Result<(), String> {
    let (profile, mut shell) = open_shell(config, &args.target, args.from_dir.as_deref())?;
    let main_config = config.main_config_for(&profile).to_string();
    let mirror_dir = args.mirror_dir.clone().unwrap_or_else(|| config.mirror_dir().join(&profile.name));

    let result = analyze_remote(shell.as_mut(), &main_config, &mirror_dir).map_err(|e| e.to_string());
    shell.close();
    let warnings = validate_structure(&result?);

    if args.json {
        let json = serde_json::to_string_pretty(&warnings).map_err(|e| e.to_string())?;
        println!("{}", json);
    } else if warnings.is_empty() {
        println!("{} {} follows the expected layout", "OK".green().bold(), main_config);
    } else {
        for warning in &warnings {
            println!("{}: {}", "warning".yellow(), warning);
        }
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Mutation {
    Create,
    Update,
}

fn run_mutation(config: &StewardConfig, args: MutateArgs, mutation: Mutation) -> Result<(), String> {
    let content = fs::read_to_string(&args.from)
        .map_err(|e| format!("Failed to read {}: {}", args.from.display(), e))?;
    let profile = args.target.resolve(config).map_err(|e| e.to_string())?;

    let outcome = with_workflow(config, &profile, |workflow| match mutation {
        Mutation::Create => workflow.create(&args.remote_path, &content),
        Mutation::Update => workflow.update(&args.remote_path, &content),
    });
    print_outcome(outcome, args.json)
}

fn run_set_backend(config: &StewardConfig, args: BackendArgs) -> Result<(), String> {
    let profile = args.target.resolve(config).map_err(|e| e.to_string())?;

    let outcome = with_workflow(config, &profile, |workflow| {
        workflow.set_backend_status(&args.remote_path, &args.address, args.status.into())
    });
    print_outcome(outcome, args.json)
}

/// Connect, run one mutation, close. A failed connect becomes a 502 outcome.
fn with_workflow<F>(config: &StewardConfig, profile: &HostProfile, mutate: F) -> Outcome
where
    F: FnOnce(&mut MutationWorkflow<'_, SshChannel>) -> Outcome,
{
    match nginx_steward::connect(profile.credentials()) {
        Ok(mut channel) => {
            let outcome = {
                let mut workflow = MutationWorkflow::new(&mut channel, config.workflow_options(profile));
                mutate(&mut workflow)
            };
            channel.close();
            outcome
        }
        Err(e) => Outcome::connection_failure(&profile.host, e.to_string()),
    }
}

fn print_outcome(outcome: Outcome, json: bool) -> Result<(), String> {
    if json {
        let json = serde_json::to_string_pretty(&outcome).map_err(|e| e.to_string())?;
        println!("{}", json);
    } else if outcome.success {
        print!("{} {}", "Success:".green().bold(), report::render_outcome(&outcome));
    } else {
        print!("{} {}", "Failed:".red().bold(), report::render_outcome(&outcome));
    }

    if outcome.success {
        Ok(())
    } else {
        Err(outcome.message)
    }
}

fn run_status(config: &StewardConfig, target: TargetArgs) -> Result<(), String> {
    let (profile, mut shell) = open_shell(config, &target, None)?;
    let probe = health::probe(shell.as_mut());
    shell.close();

    let rendered = report::render_health(&profile.name, &probe);
    if probe.nginx_running {
        print!("{}", rendered.green());
        Ok(())
    } else {
        print!("{}", rendered.red());
        Err(format!("nginx is not running on {}", profile.name))
    }
}

fn run_parse(args: ParseArgs) -> Result<(), String> {
    if !args.input.exists() {
        return Err(format!("File not found: {}", args.input.display()));
    }
    let parser = NginxParser::new();
    let mut report = parser.parse(&args.input);

    if report.status != ParseStatus::Ok {
        let raw = fs::read_to_string(&args.input).map_err(|e| format!("Failed to read file: {}", e))?;
        let path = args.input.display().to_string();
        let salvaged = parse_with_fallback(&parser, &path, &args.input, raw);
        if salvaged.status == ParseStatus::ManualOk {
            if let Some(entry) = report.config.first_mut() {
                entry.status = salvaged.status;
                entry.parsed = salvaged.directives;
            }
        }
    }

    let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}
