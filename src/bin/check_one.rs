//! 单张图片诊断工具：空候选窗口跑一遍流水线，打印标签、后端和各项分数。

use clap::error::ErrorKind;
use clap::Parser;
use photo_verifier::{Config, ReportType, VerificationInput, Verifier};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "check-one", version, about = "Score a single image with the submission verifier")]
struct Args {
    /// 待检查的图片
    image: PathBuf,

    /// 举报类型
    #[arg(long, default_value = ReportType::ILLEGAL_DUMPING)]
    report_type: String,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "photo_verifier=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(1);
        }
    };

    if !args.image.is_file() {
        eprintln!("File not found: {}", args.image.display());
        return ExitCode::from(1);
    }

    match run(&args) {
        Ok(line) => {
            println!("{}", line);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{:#}", err);
            ExitCode::from(1)
        }
    }
}

fn run(args: &Args) -> anyhow::Result<String> {
    let config = Config::from_env()?;
    let verifier = Verifier::from_config(&config);

    let input = VerificationInput::new(&args.image, ReportType::from(args.report_type.as_str()), Vec::new());
    let out = verifier.verify(&input)?;

    Ok(format!(
        "{} → {} (rel={:.2}, action={:.2}, auth={:.2}, status={}, backend={})",
        file_name(&args.image),
        out.label,
        out.relevance_score,
        out.action_score,
        out.auth_score,
        out.status,
        out.model_version
    ))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
