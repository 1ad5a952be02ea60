#![deny(missing_docs)]

//! CLI binary interface for outfitter
//!
//! Every command produces a typed envelope; `--output-format=json` prints it
//! verbatim, human mode prints a styled digest. Exit codes: 0 success,
//! 1 validation/input error, 2 operational failure (any action failed),
//! 3 internal error.

use std::io::Write;
use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use console::Term;
use outfitter::bundle::{self, ExpandedBundle, ProfileSource};
use outfitter_schema::{Action, ActionStatus, Envelope, Plan, RunRecord};

use cli::{Cli, Commands, OutputFormat};

mod cli;

fn main() -> ExitCode {
    let config = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(config.verbose)
        .with_writer(std::io::stderr)
        .init();
    real_main(&config)
}

fn real_main(cli: &Cli) -> ExitCode {
    let command_name = command_name(&cli.command);

    let config = match build_config(cli) {
        Ok(config) => config,
        Err(e) => return fail_before_session(cli, command_name, &e),
    };
    let mut session = match outfitter::Session::new(config) {
        Ok(session) => session,
        Err(e) => return fail_before_session(cli, command_name, &e),
    };
    let run_id = session.run_id.clone();

    let (result, actions_failed) = dispatch(cli, &mut session);
    let timestamp = outfitter::state::now_utc();

    let (envelope, exit_code) = match result {
        Ok(data) => {
            let mut envelope = Envelope::success(
                outfitter::CLI_VERSION,
                command_name,
                &run_id,
                &timestamp,
                data,
            );
            if actions_failed {
                envelope.success = false;
                (envelope, 2)
            } else {
                (envelope, 0)
            }
        }
        Err(e) => {
            let envelope = Envelope::failure(
                outfitter::CLI_VERSION,
                command_name,
                &run_id,
                &timestamp,
                e.to_envelope_error(),
            );
            (envelope, e.code().exit_code())
        }
    };

    if cli.wants_json() {
        let json = serde_json::to_string_pretty(&envelope)
            .expect("envelope serialization is infallible");
        println!("{json}");
    } else if let Some(error) = &envelope.error {
        let mut err = Term::stderr();
        let _ = writeln!(err, "{}", err.style().red().apply_to(&error.message));
        if let Some(remediation) = &error.remediation {
            let _ = writeln!(err, "  {remediation}");
        }
    }
    ExitCode::from(exit_code)
}

fn fail_before_session(
    cli: &Cli,
    command_name: &str,
    error: &outfitter::OutfitterError,
) -> ExitCode {
    let envelope = Envelope::failure(
        outfitter::CLI_VERSION,
        command_name,
        "",
        &outfitter::state::now_utc(),
        error.to_envelope_error(),
    );
    if cli.wants_json() {
        let json = serde_json::to_string_pretty(&envelope)
            .expect("envelope serialization is infallible");
        println!("{json}");
    } else {
        eprintln!("{error}");
    }
    ExitCode::from(error.code().exit_code())
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Capture(_) => "capture",
        Commands::Plan(_) => "plan",
        Commands::Apply(_) => "apply",
        Commands::Restore(_) => "restore",
        Commands::Revert(_) => "revert",
        Commands::Verify(_) => "verify",
        Commands::Report(_) => "report",
        Commands::Diff(_) => "diff",
        Commands::Doctor(_) => "doctor",
        Commands::ValidateBundle(_) => "validate-bundle",
        Commands::Capabilities(_) => "capabilities",
    }
}

fn build_config(cli: &Cli) -> outfitter::OutfitterResult<outfitter::Config> {
    let mut config = outfitter::Config::new_default()?;
    if let Some(root) = &cli.state_root {
        config.modules_dir = root.join("modules");
        config.profiles_dir = root.join("manifests");
        config.state_root = root.clone();
    }
    if let Some(dir) = &cli.modules_dir {
        config.modules_dir = dir.clone();
    }
    if let Some(dir) = &cli.profiles_dir {
        config.profiles_dir = dir.clone();
    }
    config.driver = cli.driver.clone();
    if let Some(events) = cli.events {
        config.events = events.to_lib();
    }
    if let Commands::Apply(args) = &cli.command {
        config.parallel = args.parallel;
    }
    Ok(config)
}

/// Run the selected command; the bool reports whether any action failed
fn dispatch(
    cli: &Cli,
    session: &mut outfitter::Session,
) -> (outfitter::OutfitterResult<serde_json::Value>, bool) {
    let human = cli.output_format == OutputFormat::Human && !cli.json;
    match &cli.command {
        Commands::Capture(args) => {
            let result = outfitter::do_capture(session, &args.to_lib());
            match result {
                Ok(outcome) => {
                    if human {
                        print_capture(&outcome);
                    }
                    (serde_json::to_value(&outcome).map_err(Into::into), false)
                }
                Err(e) => (Err(e), false),
            }
        }
        Commands::Plan(args) => match resolve_selector(session, &args.selector) {
            Ok(resolved) => match outfitter::do_plan(session, resolved.manifest_path()) {
                Ok(plan) => {
                    if human {
                        print_plan(&plan);
                    }
                    (serde_json::to_value(&plan).map_err(Into::into), false)
                }
                Err(e) => (Err(e), false),
            },
            Err(e) => (Err(e), false),
        },
        Commands::Apply(args) => {
            let (source, payload_root, _bundle_guard);
            if let Some(plan_path) = &args.plan {
                source = outfitter::ApplySource::Plan(plan_path.clone());
                payload_root = None;
                _bundle_guard = None;
            } else {
                match resolve_selector(session, &args.selector) {
                    Ok(resolved) => {
                        source =
                            outfitter::ApplySource::Manifest(resolved.manifest_path().to_owned());
                        payload_root = resolved.payload_root().map(|p| p.to_owned());
                        _bundle_guard = Some(resolved);
                    }
                    Err(e) => return (Err(e), false),
                }
            }
            let opts = outfitter::ApplyOptions {
                dry_run: args.dry_run,
                enable_restore: args.enable_restore,
                payload_root,
            };
            match outfitter::do_apply(session, &source, &opts) {
                Ok(report) => {
                    if human {
                        print_run_record(&report.record);
                    }
                    let failed = !report.record.is_success();
                    (serde_json::to_value(&report.record).map_err(Into::into), failed)
                }
                Err(e) => (Err(e), false),
            }
        }
        Commands::Restore(args) => match resolve_selector(session, &args.selector) {
            Ok(resolved) => {
                let opts = outfitter::ApplyOptions {
                    dry_run: args.dry_run,
                    enable_restore: args.enable_restore,
                    payload_root: resolved.payload_root().map(|p| p.to_owned()),
                };
                match outfitter::do_restore(session, resolved.manifest_path(), &opts) {
                    Ok(report) => {
                        if human {
                            print_run_record(&report.record);
                        }
                        let failed = !report.record.is_success();
                        (
                            serde_json::to_value(&report.record).map_err(Into::into),
                            failed,
                        )
                    }
                    Err(e) => (Err(e), false),
                }
            }
            Err(e) => (Err(e), false),
        },
        Commands::Revert(args) => {
            match outfitter::do_revert(session, args.run_id.as_deref(), args.dry_run) {
                Ok(record) => {
                    if human {
                        print_run_record(&record);
                    }
                    let failed = !record.is_success();
                    (serde_json::to_value(&record).map_err(Into::into), failed)
                }
                Err(e) => (Err(e), false),
            }
        }
        Commands::Verify(args) => match resolve_selector(session, &args.selector) {
            Ok(resolved) => match outfitter::do_verify(session, resolved.manifest_path()) {
                Ok(record) => {
                    if human {
                        print_run_record(&record);
                    }
                    let failed = !record.is_success();
                    (serde_json::to_value(&record).map_err(Into::into), failed)
                }
                Err(e) => (Err(e), false),
            },
            Err(e) => (Err(e), false),
        },
        Commands::Report(args) => {
            let selector = if let Some(id) = &args.run_id {
                outfitter::ReportSelector::RunId(id.clone())
            } else if let Some(n) = args.last {
                outfitter::ReportSelector::LastN(n)
            } else {
                outfitter::ReportSelector::Latest
            };
            match outfitter::do_report(session, &selector) {
                Ok(records) => {
                    if human {
                        for record in &records {
                            print_run_record(record);
                        }
                    }
                    (serde_json::to_value(&records).map_err(Into::into), false)
                }
                Err(e) => (Err(e), false),
            }
        }
        Commands::Diff(args) => {
            match outfitter::do_diff(session, &args.file_a, &args.file_b) {
                Ok(report) => {
                    if human {
                        print_diff(&report);
                    }
                    (serde_json::to_value(&report).map_err(Into::into), false)
                }
                Err(e) => (Err(e), false),
            }
        }
        Commands::Doctor(_) => match outfitter::do_doctor(session) {
            Ok(report) => {
                if human {
                    print_doctor(&report);
                }
                let failed = !report.ok;
                (serde_json::to_value(&report).map_err(Into::into), failed)
            }
            Err(e) => (Err(e), false),
        },
        Commands::ValidateBundle(args) => {
            match outfitter::do_validate_bundle(
                session,
                args.manifest.as_deref(),
                args.bundle.as_deref(),
            ) {
                Ok(validation) => {
                    if human {
                        print_validation(&validation);
                    }
                    let failed = !validation.ok;
                    (serde_json::to_value(&validation).map_err(Into::into), failed)
                }
                Err(e) => (Err(e), false),
            }
        }
        Commands::Capabilities(_) => {
            let caps = outfitter::do_capabilities(session);
            if human {
                let mut out = Term::stdout();
                let _ = writeln!(out, "schema {}, cli {}", caps.schema_version, caps.cli_version);
                let _ = writeln!(out, "commands: {}", caps.commands.join(", "));
                let _ = writeln!(out, "drivers: {}", caps.drivers.join(", "));
                let _ = writeln!(out, "verifiers: {}", caps.verifiers.join(", "));
            }
            (serde_json::to_value(&caps).map_err(Into::into), false)
        }
    }
}

/// A selector resolved to something loadable (keeps an extracted bundle's
/// working directory alive for the duration of the command)
enum ResolvedProfile {
    Plain(Utf8PathBuf),
    Bundle(ExpandedBundle),
}

impl ResolvedProfile {
    fn manifest_path(&self) -> &Utf8Path {
        match self {
            ResolvedProfile::Plain(path) => path,
            ResolvedProfile::Bundle(bundle) => &bundle.manifest_path,
        }
    }

    fn payload_root(&self) -> Option<&Utf8Path> {
        match self {
            ResolvedProfile::Plain(_) => None,
            ResolvedProfile::Bundle(bundle) => Some(&bundle.root),
        }
    }
}

fn resolve_selector(
    session: &outfitter::Session,
    selector: &cli::ProfileSelector,
) -> outfitter::OutfitterResult<ResolvedProfile> {
    if let Some(path) = &selector.manifest {
        return Ok(ResolvedProfile::Plain(path.clone()));
    }
    let Some(name) = &selector.profile else {
        return Err(outfitter::OutfitterError::InvalidArgument {
            message: "pass --profile <name> or --manifest <path>".to_owned(),
            help: None,
        });
    };
    match bundle::resolve_profile(name, &session.config.profiles_dir) {
        Some(ProfileSource::Zip(zip)) => Ok(ResolvedProfile::Bundle(bundle::expand_bundle(&zip)?)),
        Some(ProfileSource::Manifest(path)) => Ok(ResolvedProfile::Plain(path)),
        None => Err(outfitter::OutfitterError::ManifestNotFound {
            path: session.config.profiles_dir.join(name),
        }),
    }
}

// --- human rendering ---

fn print_plan(plan: &Plan) {
    let mut out = Term::stdout();
    for action in &plan.actions {
        let _ = print_action(&mut out, action);
    }
    let _ = writeln!(
        out,
        "plan: {} to install, {} already installed, {} restores, {} verifies",
        plan.summary.install, plan.summary.skip, plan.summary.restore, plan.summary.verify
    );
    for warning in &plan.warnings {
        let _ = writeln!(out, "{}", out.style().yellow().apply_to(format!("warning: {warning}")));
    }
}

fn print_action(out: &mut Term, action: &Action) -> std::io::Result<()> {
    match action {
        Action::App(app) => {
            let label = match app.status {
                ActionStatus::Install => out.style().green().apply_to("install"),
                ActionStatus::Skip | ActionStatus::Skipped => {
                    out.style().dim().apply_to("skip   ")
                }
                ActionStatus::Failed => out.style().red().apply_to("failed "),
                _ => out.style().dim().apply_to("app    "),
            };
            writeln!(out, "  {label} {} ({})", app.id, app.package_ref)?;
        }
        Action::Restore(restore) => {
            writeln!(
                out,
                "  {} {} -> {}",
                out.style().blue().apply_to(restore.restore_type.to_string()),
                restore.source,
                restore.target
            )?;
        }
        Action::Verify(verify) => {
            writeln!(
                out,
                "  {} {}",
                out.style().magenta().apply_to(verify.verify_type.to_string()),
                verify.path.as_deref().or(verify.command.as_deref()).unwrap_or("")
            )?;
        }
    }
    Ok(())
}

fn print_run_record(record: &RunRecord) {
    let mut out = Term::stdout();
    let _ = writeln!(
        out,
        "{} [{}]{}: {} succeeded, {} skipped, {} failed",
        record.command,
        record.run_id,
        if record.dry_run { " (dry run)" } else { "" },
        record.summary.success,
        record.summary.skipped,
        record.summary.failed,
    );
    for action in &record.actions {
        if action.status() == ActionStatus::Failed {
            let detail = match action {
                Action::App(a) => a.error.clone().unwrap_or_default(),
                Action::Restore(a) => a.error.clone().unwrap_or_default(),
                Action::Verify(a) => a
                    .error
                    .clone()
                    .or_else(|| a.message.clone())
                    .unwrap_or_default(),
            };
            let _ = writeln!(
                out,
                "  {} {}: {detail}",
                out.style().red().apply_to("failed"),
                action.id()
            );
        }
    }
    for warning in &record.warnings {
        let _ = writeln!(out, "{}", out.style().yellow().apply_to(format!("warning: {warning}")));
    }
}

fn print_diff(report: &outfitter::DiffReport) {
    let mut out = Term::stdout();
    if report.identical {
        let _ = writeln!(out, "profiles are identical");
        return;
    }
    for id in &report.apps_added {
        let _ = writeln!(out, "{}", out.style().green().apply_to(format!("+ app {id}")));
    }
    for id in &report.apps_removed {
        let _ = writeln!(out, "{}", out.style().red().apply_to(format!("- app {id}")));
    }
    let _ = writeln!(out, "{}", report.text_diff);
}

fn print_doctor(report: &outfitter_schema::DoctorReport) {
    let mut out = Term::stdout();
    for check in &report.checks {
        let mark = if check.ok {
            out.style().green().apply_to("ok  ")
        } else {
            out.style().red().apply_to("FAIL")
        };
        let _ = writeln!(out, "  {mark} {}: {}", check.name, check.message);
    }
}

fn print_validation(validation: &outfitter::BundleValidation) {
    let mut out = Term::stdout();
    for error in &validation.errors {
        let _ = writeln!(out, "{}", out.style().red().apply_to(format!("error: {error}")));
    }
    for warning in &validation.warnings {
        let _ = writeln!(out, "{}", out.style().yellow().apply_to(format!("warning: {warning}")));
    }
    if validation.ok {
        let _ = writeln!(out, "profile is valid");
    }
}

fn print_capture(outcome: &outfitter::CaptureOutcome) {
    let mut out = Term::stdout();
    let _ = writeln!(
        out,
        "captured {} apps to {}",
        outcome.app_count,
        out.style().green().apply_to(&outcome.manifest_path)
    );
    if let Some(bundle) = &outcome.bundle_path {
        let _ = writeln!(out, "bundle: {}", out.style().green().apply_to(bundle));
    }
    for module in &outcome.discovered_modules {
        let _ = writeln!(out, "  matched module {module}");
    }
    for warning in &outcome.warnings {
        let _ = writeln!(out, "{}", out.style().yellow().apply_to(format!("warning: {warning}")));
    }
}
