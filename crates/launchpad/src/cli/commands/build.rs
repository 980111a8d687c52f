//! Build command - Build the scheme with xcodebuild

use std::path::PathBuf;

use clap::Args;

use launchpad_xcode::Destination;

use crate::cli::{output, Cli, OutputFormat, Session};
use crate::exit_codes;

/// Build the scheme
#[derive(Debug, Args)]
pub struct BuildCommand {
    /// Build for testing on the reference simulator
    #[arg(long)]
    pub for_testing: bool,

    /// Build for a generic iOS device instead of the reference simulator
    #[arg(long, conflicts_with = "for_testing")]
    pub generic: bool,

    /// Archive to this path instead of building
    #[arg(long, conflicts_with_all = ["for_testing", "generic"])]
    pub archive: Option<PathBuf>,

    /// Resolve package dependencies first
    #[arg(long)]
    pub resolve: bool,

    /// Print the build settings and exit
    #[arg(long)]
    pub show_settings: bool,
}

impl BuildCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<i32> {
        let session = Session::load(cli, |_| {})?;
        session.watch_interrupts();
        let builder = session.builder();

        if self.show_settings {
            let settings = builder.show_build_settings().await?;
            if cli.format == OutputFormat::Json {
                output::json(&serde_json::json!({ "settings": settings }))?;
            } else {
                print!("{}", settings);
            }
            return Ok(exit_codes::SUCCESS);
        }

        if self.resolve {
            builder.resolve_dependencies().await?;
        }

        if let Some(ref path) = self.archive {
            builder.archive(path).await?;
            if cli.shows_progress() {
                output::success(&format!("Archived to {}", output::path_style().apply_to(path.display())));
            }
            return Ok(exit_codes::SUCCESS);
        }

        let destination = if self.generic {
            Destination::generic_ios()
        } else {
            Destination::from(&session.reference().await?)
        };
        if cli.shows_progress() {
            output::info(&format!("Building {} for {}", session.config.scheme, destination));
        }
        builder.build(self.for_testing, &destination).await?;

        if session.interrupted() {
            return Ok(exit_codes::CANCELLED);
        }
        if cli.format == OutputFormat::Json {
            output::json(&serde_json::json!({
                "scheme": session.config.scheme,
                "destination": destination.to_arg(),
                "derived_data": builder.derived_data(),
            }))?;
        } else if !cli.quiet {
            output::success("Build succeeded");
        }
        Ok(exit_codes::SUCCESS)
    }
}
