use clap::{Parser, Subcommand};
use clap::CommandFactory;

use crate::launch::{self, LaunchOptions};
use crate::output;
use crate::paths;
use crate::prompt::TerminalPrompter;
use crate::tls::{self, CertificateMaterial};

/// Quire - Local workbook server launcher
#[derive(Parser)]
#[command(name = "quire")]
#[command(version, disable_version_flag = true)]
#[command(about = "Quire - Local workbook server launcher")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Show version
    #[arg(long, global = true)]
    pub version: bool,

    /// Show verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}


#[derive(Subcommand)]
pub enum Commands {
    /// Start the workbook server
    Run(RunArgs),

    /// Generate the self-signed certificate used by --secure
    Setup,
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// Workbook directory (defaults to ~/.quire/workbook)
    #[arg(long, value_name = "DIR")]
    pub dir: Option<std::path::PathBuf>,

    /// Preferred listening port; the next free port is taken when busy
    #[arg(long, default_value_t = launch::DEFAULT_PORT)]
    pub port: u16,

    /// Interface to listen on
    #[arg(long, default_value = launch::DEFAULT_INTERFACE)]
    pub interface: String,

    /// Deprecated alias for --interface
    #[arg(long, value_name = "INTERFACE", hide = true)]
    pub address: Option<String>,

    /// How many consecutive ports to probe before giving up
    #[arg(long, value_name = "N", default_value_t = launch::DEFAULT_PORT_TRIES)]
    pub port_tries: u32,

    /// Serve over HTTPS with a self-signed certificate
    #[arg(long)]
    pub secure: bool,

    /// Reset the admin password before starting
    #[arg(long)]
    pub reset: bool,

    /// Skip the login page entirely
    #[arg(long)]
    pub no_login: bool,

    /// Idle session timeout in seconds; 0 disables it
    #[arg(long, value_name = "SECONDS", default_value_t = 0)]
    pub timeout: u64,

    /// Compute-pool descriptor forwarded to the application
    #[arg(long, value_name = "POOL")]
    pub server_pool: Option<String>,

    /// Resource-limit string applied to workbook processes
    #[arg(long, value_name = "LIMITS", default_value = "")]
    pub ulimit: String,

    /// Workbook file to import once the server is up
    #[arg(long, value_name = "FILE")]
    pub upload: Option<std::path::PathBuf>,

    /// Do not open a web browser after starting
    #[arg(long)]
    pub no_browser: bool,

    /// Detach and keep the server running in the background
    #[arg(long)]
    pub fork: bool,

    /// Suppress the startup banners
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Removed; kept so old invocations get an explanation
    #[arg(long, value_name = "N", hide = true)]
    pub subnets: Option<u32>,
}

impl RunArgs {
    /// Turns parsed flags into launch options, applying the deprecation and
    /// removal policies before anything touches the filesystem.
    pub fn resolve(self) -> Result<LaunchOptions, Box<dyn std::error::Error>> {
        if self.subnets.is_some() {
            return Err(
                "The --subnets option is no longer supported. Use a firewall to restrict \
                 access, or run a separate server per subnet."
                    .into(),
            );
        }

        let mut interface = self.interface;
        if let Some(address) = self.address {
            output::warning("The --address option is deprecated. Please use --interface instead.");
            if interface != launch::DEFAULT_INTERFACE {
                return Err("both --address and --interface were specified".into());
            }
            interface = address;
        }

        let directory = match self.dir {
            Some(dir) => dir,
            None => paths::default_workbook_dir()?,
        };

        Ok(LaunchOptions {
            directory,
            port: self.port,
            interface,
            port_tries: self.port_tries,
            secure: self.secure,
            reset: self.reset,
            require_login: !self.no_login,
            timeout: self.timeout,
            server_pool: self.server_pool,
            ulimit: self.ulimit,
            upload: self.upload,
            open_viewer: !self.no_browser,
            start_path: String::new(),
            fork: self.fork,
            quiet: self.quiet,
        })
    }
}

impl Cli {
    pub fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        if self.version {
            println!("{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }

        let Some(command) = self.command else {
            Cli::command().print_help()?;
            println!();
            return Ok(());
        };

        match command {
            Commands::Run(args) => {
                let options = args.resolve()?;
                let mut prompter = TerminalPrompter;
                launch::run(options, &mut prompter)?;
                Ok(())
            }
            Commands::Setup => {
                let dir = paths::tls_dir()?;
                let material = CertificateMaterial::in_dir(&dir);
                let mut prompter = TerminalPrompter;
                tls::provision(&material, &mut prompter)?;
                output::success("Successfully configured quire.");
                Ok(())
            }
        }
    }
}
