// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::{Parser, Subcommand};
use distlock::commands::hold::HoldCommand;
use distlock::commands::list::ListCommand;
use distlock::commands::lock::LockCommand;
use distlock::commands::purge::PurgeCommand;
use distlock::commands::refresh::RefreshCommand;
use distlock::commands::status::StatusCommand;
use distlock::commands::unlock::UnlockCommand;
use distlock::config::new_distlock_config;
use distlock::error::{
    DistLockError, Result, format_error_chain, format_error_with_color, get_exit_code,
};
use distlock::logging;
use std::io::{self, IsTerminal};

#[derive(Parser)]
#[command(name = "distlock")]
#[command(author, version, about = "Distributed resource locks over a shared SQL table", long_about = None)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Bound on each store round trip: seconds or "infinite"
    #[arg(long, value_name = "SECONDS", global = true)]
    lock_timeout: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire a lease on a resource
    Lock {
        /// Resource identifier
        resource: String,
        /// Logical owner of the lock
        owner: String,
        /// Lease length in seconds (defaults to locking.default_hold_secs)
        #[arg(long, value_name = "SECONDS")]
        hold_secs: Option<u64>,
        /// Keep retrying for up to SECONDS (or "infinite") while the resource is held
        #[arg(long, value_name = "SECONDS")]
        wait: Option<String>,
    },

    /// Extend a lease held by OWNER
    Refresh {
        resource: String,
        owner: String,
        #[arg(long, value_name = "SECONDS")]
        hold_secs: Option<u64>,
    },

    /// Release a lock held by OWNER
    #[command(visible_alias = "release")]
    Unlock { resource: String, owner: String },

    /// Show the lock row for a resource
    Status {
        resource: String,
        /// Also report whether this owner holds a live lease
        #[arg(long)]
        owner: Option<String>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List every lock row
    #[command(visible_alias = "ls")]
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Acquire a resource and keep renewing it until interrupted
    Hold {
        resource: String,
        /// Owner name (generated from the host name when omitted)
        owner: Option<String>,
        #[arg(long, value_name = "SECONDS")]
        hold_secs: Option<u64>,
    },

    /// Delete rows that expired more than the grace period ago
    Purge {
        /// Grace period in seconds (defaults to locking.purge_grace_secs)
        #[arg(long, value_name = "SECONDS")]
        grace_secs: Option<u64>,
    },
}

fn main() {
    let cli = Cli::parse();

    logging::setup_logger(cli.verbose);

    let config = match new_distlock_config() {
        Ok(config) => config,
        Err(e) => exit_with(&e),
    };

    let lock_timeout = cli.lock_timeout.as_deref();
    let result: Result<()> = (|| match cli.command {
        Commands::Lock {
            resource,
            owner,
            hold_secs,
            wait,
        } => {
            let command = LockCommand::new(&config, lock_timeout)?;
            command.execute(&resource, &owner, hold_secs, wait.as_deref())
        }
        Commands::Refresh {
            resource,
            owner,
            hold_secs,
        } => {
            let command = RefreshCommand::new(&config, lock_timeout)?;
            command.execute(&resource, &owner, hold_secs)
        }
        Commands::Unlock { resource, owner } => {
            let command = UnlockCommand::new(&config, lock_timeout)?;
            command.execute(&resource, &owner)
        }
        Commands::Status {
            resource,
            owner,
            json,
        } => {
            let command = StatusCommand::new(&config, lock_timeout)?;
            command.execute(&resource, owner.as_deref(), json)
        }
        Commands::List { json } => {
            let command = ListCommand::new(&config, lock_timeout)?;
            command.execute(json)
        }
        Commands::Hold {
            resource,
            owner,
            hold_secs,
        } => {
            let command = HoldCommand::new(&config, lock_timeout)?;
            command.execute(&resource, owner.as_deref(), hold_secs)
        }
        Commands::Purge { grace_secs } => {
            let command = PurgeCommand::new(&config)?;
            command.execute(grace_secs)
        }
    })();

    if let Err(e) = result {
        exit_with(&e);
    }
}

fn exit_with(error: &DistLockError) -> ! {
    if io::stderr().is_terminal() {
        eprintln!("{}", format_error_with_color(error, true));
    } else {
        eprintln!("{}", format_error_chain(error));
    }
    std::process::exit(get_exit_code(error));
}
