use std::path::PathBuf;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::Parser;
use tracing_subscriber::fmt::format::FmtSpan;

use cloudaudit_template::{
    check_template, collect_templates, CfnValidator, CheckOutcome, TemplateReport,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "cfn-validate — CloudFormation template validation (syntax, remote validation, security checks)")]
struct Cli {
    /// Template file or directory to validate
    target: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_span_events(FmtSpan::CLOSE).init();
    // Argument errors exit 1, matching every other failure of this tool.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    // Invalid target fails before any file is checked.
    let files = collect_templates(&cli.target)?;

    let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    if !credentials_available(&config).await {
        anyhow::bail!("AWS credentials not configured");
    }
    let validator = CfnValidator::new(aws_sdk_cloudformation::Client::new(&config));

    println!("CloudFormation template validation");
    println!("{}", "=".repeat(50));

    let mut passed = 0usize;
    for path in &files {
        println!();
        println!("Validating: {}", path.display());
        let report = check_template(&validator, path).await;
        print_report(&report);
        if report.passed() {
            passed += 1;
        }
    }

    println!();
    println!("{}", "=".repeat(50));
    println!("Summary: {passed}/{} files passed validation", files.len());

    if passed == files.len() {
        println!("All templates are valid.");
        Ok(())
    } else {
        println!("Some templates have issues.");
        std::process::exit(1);
    }
}

fn print_report(report: &TemplateReport) {
    fn mark(outcome: &CheckOutcome) -> &'static str {
        if outcome.valid {
            "[OK]"
        } else {
            "[FAIL]"
        }
    }

    println!("  {} YAML syntax: {}", mark(&report.syntax), report.syntax.message);
    let Some(remote) = &report.remote else { return };
    println!("  {} CloudFormation: {}", mark(remote), remote.message);
    if !remote.valid {
        return;
    }
    if report.issues.is_empty() {
        println!("  [OK] security: no issues found");
    } else {
        println!("  [WARN] security issues:");
        for issue in &report.issues {
            println!("    - {issue}");
        }
    }
}

async fn credentials_available(config: &aws_config::SdkConfig) -> bool {
    use aws_credential_types::provider::ProvideCredentials;
    match config.credentials_provider() {
        Some(provider) => provider.provide_credentials().await.is_ok(),
        None => false,
    }
}
