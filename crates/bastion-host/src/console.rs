//! Line-oriented operator console over the economy.
//!
//! One command per line. Bad input is answered and the loop carries on;
//! only console I/O failures end it.

use bastion_economy::{Economy, TransferOutcome};
use bastion_types::EntityId;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _};

use crate::error::HostError;

/// Console usage text.
pub const HELP: &str = "\
commands:
  balance <player>                 show cash, bank and interest rate
  pay <from> <to> <amount>         move cash between players
  deposit <player> <amount>        move cash into the bank
  withdraw <player> <amount>       move banked funds to cash
  rate <player> <rate>             set the interest rate
  interest <player>                apply interest once
  flush                            wait for queued writes
  help                             show this text
  quit                             exit";

/// A parsed console command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Show an account.
    Balance(EntityId),
    /// Cash transfer between two players.
    Pay {
        /// Paying player.
        from: EntityId,
        /// Receiving player.
        to: EntityId,
        /// Amount to move.
        amount: f64,
    },
    /// Cash to bank.
    Deposit {
        /// Account owner.
        player: EntityId,
        /// Amount to move.
        amount: f64,
    },
    /// Bank to cash.
    Withdraw {
        /// Account owner.
        player: EntityId,
        /// Amount to move.
        amount: f64,
    },
    /// Set an interest rate.
    Rate {
        /// Account owner.
        player: EntityId,
        /// New rate.
        rate: f64,
    },
    /// Apply interest once.
    Interest(EntityId),
    /// Wait for queued writes.
    Flush,
    /// Show usage.
    Help,
    /// Leave the console.
    Quit,
}

/// Why a line could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Nothing but whitespace.
    #[error("empty command")]
    Empty,

    /// First word is not a command.
    #[error("unknown command {word:?}, try `help`")]
    Unknown {
        /// The unrecognized word.
        word: String,
    },

    /// Wrong number of arguments.
    #[error("usage: {usage}")]
    Usage {
        /// Expected shape of the command.
        usage: &'static str,
    },

    /// A player argument was not a UUID.
    #[error("invalid player id {value:?}: {source}")]
    BadId {
        /// The rejected text.
        value: String,
        /// The underlying parse error.
        source: uuid::Error,
    },

    /// A numeric argument was not a number.
    #[error("invalid number {value:?}: {source}")]
    BadNumber {
        /// The rejected text.
        value: String,
        /// The underlying parse error.
        source: core::num::ParseFloatError,
    },
}

impl core::str::FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&verb, args)) = words.split_first() else {
            return Err(ParseError::Empty);
        };
        match (verb.to_ascii_lowercase().as_str(), args) {
            ("balance", [player]) => Ok(Self::Balance(id(player)?)),
            ("balance", _) => Err(usage("balance <player>")),
            ("pay", [from, to, amount]) => Ok(Self::Pay {
                from: id(from)?,
                to: id(to)?,
                amount: number(amount)?,
            }),
            ("pay", _) => Err(usage("pay <from> <to> <amount>")),
            ("deposit", [player, amount]) => Ok(Self::Deposit {
                player: id(player)?,
                amount: number(amount)?,
            }),
            ("deposit", _) => Err(usage("deposit <player> <amount>")),
            ("withdraw", [player, amount]) => Ok(Self::Withdraw {
                player: id(player)?,
                amount: number(amount)?,
            }),
            ("withdraw", _) => Err(usage("withdraw <player> <amount>")),
            ("rate", [player, rate]) => Ok(Self::Rate {
                player: id(player)?,
                rate: number(rate)?,
            }),
            ("rate", _) => Err(usage("rate <player> <rate>")),
            ("interest", [player]) => Ok(Self::Interest(id(player)?)),
            ("interest", _) => Err(usage("interest <player>")),
            ("flush", []) => Ok(Self::Flush),
            ("help", _) => Ok(Self::Help),
            ("quit" | "exit", []) => Ok(Self::Quit),
            _ => Err(ParseError::Unknown {
                word: verb.to_owned(),
            }),
        }
    }
}

const fn usage(usage: &'static str) -> ParseError {
    ParseError::Usage { usage }
}

fn id(value: &str) -> Result<EntityId, ParseError> {
    value.parse().map_err(|source| ParseError::BadId {
        value: value.to_owned(),
        source,
    })
}

fn number(value: &str) -> Result<f64, ParseError> {
    value.parse().map_err(|source| ParseError::BadNumber {
        value: value.to_owned(),
        source,
    })
}

/// What the loop does after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Print this and read the next line.
    Text(String),
    /// Stop reading.
    Quit,
}

/// Serves commands against one [`Economy`].
#[derive(Debug)]
pub struct Console {
    economy: Economy,
}

impl Console {
    /// Wrap an economy.
    pub const fn new(economy: Economy) -> Self {
        Self { economy }
    }

    /// The economy commands run against.
    pub const fn economy(&self) -> &Economy {
        &self.economy
    }

    /// Read commands from `input` until `quit` or end of input, writing
    /// one reply per command to `output`. Queued writes are flushed before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Io`] if reading or writing fails.
    pub async fn run<R, W>(&self, input: R, mut output: W) -> Result<(), HostError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let reply = match line.parse::<Command>() {
                Ok(command) => self.reply(command).await,
                Err(err) => Reply::Text(err.to_string()),
            };
            match reply {
                Reply::Text(text) => {
                    output.write_all(text.as_bytes()).await?;
                    output.write_all(b"\n").await?;
                    output.flush().await?;
                }
                Reply::Quit => break,
            }
        }
        self.economy().registry().runtime().flush().await;
        Ok(())
    }

    /// Execute `command`, turning failures into operator-facing text.
    pub async fn reply(&self, command: Command) -> Reply {
        match self.execute(command).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(error = %err, ?command, "console command failed");
                Reply::Text(format!("error: {err}"))
            }
        }
    }

    /// Execute `command`.
    ///
    /// # Errors
    ///
    /// Propagates store and economy failures.
    pub async fn execute(&self, command: Command) -> Result<Reply, HostError> {
        let eco = &self.economy;
        let text = match command {
            Command::Balance(player) => {
                let balances = eco.balances(player).await?;
                serde_json::to_string(&balances).map_err(bastion_store::StoreError::from)?
            }
            Command::Pay { from, to, amount } => describe(&eco.pay(amount, from, to).await?),
            Command::Deposit { player, amount } => describe(&eco.deposit(player, amount).await?),
            Command::Withdraw { player, amount } => {
                describe(&eco.withdraw(player, amount).await?)
            }
            Command::Rate { player, rate } => {
                eco.set_interest_rate(player, rate).await?;
                format!("interest rate set to {rate}")
            }
            Command::Interest(player) => {
                let credited = eco.apply_interest(player).await?;
                format!("credited {credited}")
            }
            Command::Flush => {
                eco.registry().runtime().flush().await;
                "flushed".to_owned()
            }
            Command::Help => HELP.to_owned(),
            Command::Quit => return Ok(Reply::Quit),
        };
        Ok(Reply::Text(text))
    }
}

fn describe(outcome: &TransferOutcome) -> String {
    match outcome.receipt() {
        Some(receipt) => format!(
            "{outcome} (receipt {}, balances {} -> {})",
            receipt.id, receipt.source_balance, receipt.target_balance
        ),
        None => format!("rejected: {outcome}"),
    }
}
