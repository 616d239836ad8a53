//! CLI command definitions and execution

use std::path::PathBuf;

use anyhow::{bail, Context as _};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use chainchat_core::harness::Fixture;
use chainchat_core::keyfile::{key_file_path, load_keys, save_keys};
use chainchat_crypto::addressing::{group_chat_id, pairwise_chat_id};
use chainchat_crypto::{signing, HybridCipher, KeyPair};

use crate::config::Config;
use crate::output::{KeygenOutput, OutputFormat, OutputFormatter};
use crate::ExitCode;

/// chainchat - end-to-end encrypted direct messages over a ledger and a blob store
#[derive(Parser, Debug)]
#[command(name = "chainchat")]
#[command(version, about = "chainchat - end-to-end encrypted messaging")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: text or json
    #[arg(long, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug mode (per-message pipeline tracing)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true, env = "CHAINCHAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding <username>.key files (overrides the config file)
    #[arg(long, global = true, env = "CHAINCHAT_KEYS_DIR")]
    pub keys_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a key pair and write <keys-dir>/<username>.key
    Keygen(KeygenArgs),
    /// Compute the chat id of two users, or of a named group
    ChatId(ChatIdArgs),
    /// Seal a message to a user's public key
    Encrypt(EncryptArgs),
    /// Open a hex envelope with a user's private key
    Decrypt(DecryptArgs),
    /// Sign a message as a user
    Sign(SignArgs),
    /// Check a "<r>,<s>" signature against a user's public key
    Verify(VerifyArgs),
    /// Send messages and read them back over in-memory stores
    Demo(DemoArgs),
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Keygen(_) => "keygen",
            Commands::ChatId(_) => "chat-id",
            Commands::Encrypt(_) => "encrypt",
            Commands::Decrypt(_) => "decrypt",
            Commands::Sign(_) => "sign",
            Commands::Verify(_) => "verify",
            Commands::Demo(_) => "demo",
        }
    }
}

#[derive(Args, Debug)]
pub struct KeygenArgs {
    pub username: String,

    /// Overwrite an existing key file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ChatIdArgs {
    /// Group name; hashes the name instead of a member pair
    #[arg(long, conflicts_with_all = ["a", "b"])]
    pub group: Option<String>,

    #[arg(required_unless_present = "group")]
    pub a: Option<String>,

    #[arg(required_unless_present = "group")]
    pub b: Option<String>,
}

#[derive(Args, Debug)]
pub struct EncryptArgs {
    /// Recipient username
    #[arg(long)]
    pub to: String,

    pub text: String,
}

#[derive(Args, Debug)]
pub struct DecryptArgs {
    /// Recipient username whose private key opens the envelope
    #[arg(long = "as")]
    pub as_user: String,

    /// Hex envelope
    pub envelope: String,
}

#[derive(Args, Debug)]
pub struct SignArgs {
    #[arg(long = "as")]
    pub as_user: String,

    pub text: String,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Claimed signer
    #[arg(long)]
    pub from: String,

    #[arg(long)]
    pub signature: String,

    pub text: String,
}

#[derive(Args, Debug)]
pub struct DemoArgs {
    #[arg(long)]
    pub from: String,

    #[arg(long)]
    pub to: String,

    #[arg(required = true)]
    pub texts: Vec<String>,
}

/// Everything a command needs besides its own arguments.
pub struct CommandContext {
    pub config: Config,
    /// Where `keygen` writes a default config file on first use; `None` skips it.
    pub config_path: Option<PathBuf>,
    pub keys_dir: PathBuf,
    pub formatter: OutputFormatter,
}

/// Rendered command result; the caller prints `text` and exits with `code`.
#[derive(Debug)]
pub struct CommandOutput {
    pub text: String,
    pub code: ExitCode,
}

impl CommandOutput {
    fn success(text: String) -> Self {
        Self {
            text,
            code: ExitCode::Success,
        }
    }
}

impl CommandContext {
    async fn load(&self, username: &str) -> anyhow::Result<KeyPair> {
        load_keys(&self.keys_dir, username)
            .await
            .with_context(|| format!("loading keys for {username}"))
    }

    fn cipher(&self) -> HybridCipher {
        HybridCipher::new(self.config.crypto.key_derivation)
    }
}

impl Cli {
    /// Run the command; `config` has already been loaded and validated.
    pub async fn execute_with_config(self, config: Config) -> anyhow::Result<ExitCode> {
        let keys_dir = self.keys_dir.clone().unwrap_or_else(|| config.keys_dir());
        let config_path = self.config.clone().or_else(Config::default_path);
        let ctx = CommandContext {
            config,
            config_path,
            keys_dir,
            formatter: OutputFormatter::new(self.output),
        };

        let output = self.command.execute(&ctx).await?;
        println!("{}", output.text);
        Ok(output.code)
    }
}

impl Commands {
    pub async fn execute(self, ctx: &CommandContext) -> anyhow::Result<CommandOutput> {
        match self {
            Commands::Keygen(args) => args.execute(ctx).await,
            Commands::ChatId(args) => args.execute(ctx).await,
            Commands::Encrypt(args) => args.execute(ctx).await,
            Commands::Decrypt(args) => args.execute(ctx).await,
            Commands::Sign(args) => args.execute(ctx).await,
            Commands::Verify(args) => args.execute(ctx).await,
            Commands::Demo(args) => args.execute(ctx).await,
        }
    }
}

impl KeygenArgs {
    pub async fn execute(self, ctx: &CommandContext) -> anyhow::Result<CommandOutput> {
        let path = key_file_path(&ctx.keys_dir, &self.username)?;
        if path.exists() && !self.force {
            bail!(
                "key file {} already exists; pass --force to overwrite",
                path.display()
            );
        }

        let keys = KeyPair::generate().context("generating key pair")?;
        let path = save_keys(&ctx.keys_dir, &self.username, &keys).await?;
        info!(username = %self.username, "generated key pair");

        if let Some(config_path) = &ctx.config_path {
            if ctx.config.save_if_missing(config_path).context("writing config file")? {
                info!(path = %config_path.display(), "wrote default config");
            }
        }

        Ok(CommandOutput::success(ctx.formatter.format_keygen(&KeygenOutput {
            username: self.username,
            path: path.display().to_string(),
            public_key: keys.public_text().to_string(),
        })))
    }
}

impl ChatIdArgs {
    pub async fn execute(self, ctx: &CommandContext) -> anyhow::Result<CommandOutput> {
        let chat_id = match (self.group, self.a, self.b) {
            (Some(group), _, _) => group_chat_id(&group),
            (None, Some(a), Some(b)) => {
                let a = ctx.load(&a).await?;
                let b = ctx.load(&b).await?;
                pairwise_chat_id(a.public_text(), b.public_text())
            }
            _ => bail!("either --group or two usernames are required"),
        };
        Ok(CommandOutput::success(
            ctx.formatter.format_value("chat_id", &chat_id.to_hex(), "chat-id"),
        ))
    }
}

impl EncryptArgs {
    pub async fn execute(self, ctx: &CommandContext) -> anyhow::Result<CommandOutput> {
        let recipient = ctx.load(&self.to).await?;
        let envelope = ctx
            .cipher()
            .encrypt_text(&self.text, recipient.public_text())
            .context("encrypting message")?;
        Ok(CommandOutput::success(
            ctx.formatter.format_value("envelope", &envelope, "encrypt"),
        ))
    }
}

impl DecryptArgs {
    pub async fn execute(self, ctx: &CommandContext) -> anyhow::Result<CommandOutput> {
        let me = ctx.load(&self.as_user).await?;
        let private = me.private_text()?;
        let plaintext = ctx
            .cipher()
            .decrypt_text(self.envelope.trim(), &private)
            .context("decrypting envelope")?;
        Ok(CommandOutput::success(
            ctx.formatter.format_value("plaintext", &plaintext, "decrypt"),
        ))
    }
}

impl SignArgs {
    pub async fn execute(self, ctx: &CommandContext) -> anyhow::Result<CommandOutput> {
        let me = ctx.load(&self.as_user).await?;
        let signature = signing::sign(self.text.as_bytes(), me.secret_key())?;
        Ok(CommandOutput::success(
            ctx.formatter.format_value("signature", &signature, "sign"),
        ))
    }
}

impl VerifyArgs {
    pub async fn execute(self, ctx: &CommandContext) -> anyhow::Result<CommandOutput> {
        let signer = ctx.load(&self.from).await?;
        let valid = signing::verify(self.text.as_bytes(), self.signature.trim(), signer.public_key())?;
        Ok(CommandOutput {
            text: ctx.formatter.format_verify(valid),
            code: if valid {
                ExitCode::Success
            } else {
                ExitCode::VerificationFailed
            },
        })
    }
}

impl DemoArgs {
    pub async fn execute(self, ctx: &CommandContext) -> anyhow::Result<CommandOutput> {
        let sender = ctx.load(&self.from).await?;
        let receiver = ctx.load(&self.to).await?;

        let fx = Fixture::with_config(ctx.config.pipeline_config());
        let mut chat_id = None;
        for text in &self.texts {
            let (id, _) = fx
                .pipeline
                .send_direct(&sender, receiver.public_text(), text)
                .await
                .context("sending message")?;
            chat_id = Some(id);
        }
        let Some(chat_id) = chat_id else {
            bail!("nothing to send");
        };

        let received = fx
            .pipeline
            .receive_messages(&chat_id, &receiver, sender.public_text())
            .await
            .context("receiving chat")?;

        let names = |key: &str| {
            if key == sender.public_text() {
                self.from.clone()
            } else if key == receiver.public_text() {
                self.to.clone()
            } else {
                key.to_string()
            }
        };
        Ok(CommandOutput::success(ctx.formatter.format_transcript(
            &chat_id.to_hex(),
            &received,
            &names,
        )))
    }
}
