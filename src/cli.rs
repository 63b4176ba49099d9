//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use sicar_core::{CarNumber, PolygonKind, Region, SicarConfig, SolverKind};

/// Download rural-property shapefiles from the SICAR public portal.
///
/// Every export is gated by an image captcha; sicar solves it with an
/// external OCR program and retries until the portal hands over the archive.
#[derive(Parser, Debug)]
#[command(name = "sicar")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/sicar/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Captcha rounds per download before giving up (1-1000)
    #[arg(long, value_name = "N", global = true, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub max_attempts: Option<u32>,

    /// Captcha solver backend
    #[arg(long, value_enum, global = true)]
    pub solver: Option<SolverArg>,

    /// Solver executable (tesseract path, or the program for --solver command)
    #[arg(long, value_name = "PROGRAM", global = true)]
    pub solver_program: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download one polygon layer for one state
    State {
        /// State code (e.g. SP)
        region: Region,
        /// Layer token or name (e.g. APPS, AREA_IMOVEL, legal_reserve)
        polygon: PolygonKind,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Download one polygon layer for every state
    Country {
        /// Layer token or name
        polygon: PolygonKind,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Concurrent sessions (1-32)
        #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=32))]
        concurrency: Option<u8>,
    },

    /// Download the shapefile of one registered property
    Car {
        /// CAR number (e.g. SP-3538709-4861E981046E49BC81720C879459E554)
        car_number: CarNumber,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Print the published record of one property as JSON
    Search {
        /// CAR number
        car_number: CarNumber,
    },

    /// List per-state data release dates
    ReleaseDates {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Captcha solver backends selectable from the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverArg {
    /// Tesseract OCR
    Tesseract,
    /// Any program reading the image on stdin
    Command,
}

impl From<SolverArg> for SolverKind {
    fn from(arg: SolverArg) -> Self {
        match arg {
            SolverArg::Tesseract => SolverKind::Tesseract,
            SolverArg::Command => SolverKind::Command,
        }
    }
}

impl Args {
    /// Applies command-line overrides on top of file/default configuration.
    pub fn apply_overrides(&self, config: &mut SicarConfig) {
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(solver) = self.solver {
            config.solver.kind = solver.into();
        }
        if let Some(program) = &self.solver_program {
            config.solver.program = Some(program.clone());
        }
        if let Command::Country {
            concurrency: Some(concurrency),
            ..
        } = &self.command
        {
            config.max_concurrent_downloads = usize::from(*concurrency);
        }
    }
}
