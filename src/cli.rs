//! Command-line surface: parse arguments and drive entities through the session.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use tracing::info;

use trellis::sync::{IdRule, Remote, Session, SubmitHandle};
use trellis::trello::api_types::{AttachmentSnapshot, StickerSnapshot};
use trellis::trello::{Action, Attachment, Member, Position, Sticker, TrelloClient};

#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(about = "Inspect and edit Trello entities from the terminal")]
#[command(version)]
pub struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/trellis/config.yaml)
  #[arg(short, long)]
  pub config: Option<PathBuf>,

  /// Log to stderr at debug level instead of the log file
  #[arg(short, long)]
  pub verbose: bool,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Members (by id or username)
  #[command(subcommand)]
  Member(MemberCommand),
  /// Actions such as comments
  #[command(subcommand)]
  Action(ActionCommand),
  /// Card attachments
  #[command(subcommand)]
  Attachment(AttachmentCommand),
  /// Card stickers
  #[command(subcommand)]
  Sticker(StickerCommand),
}

#[derive(Subcommand, Debug)]
pub enum MemberCommand {
  Show { id: String },
}

#[derive(Subcommand, Debug)]
pub enum ActionCommand {
  Show { id: String },
  /// Replace a comment's text
  Edit { id: String, text: String },
  Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum AttachmentCommand {
  List { card: String },
  Show { card: String, id: String },
  Rename { card: String, id: String, name: String },
  /// Move to `top`, `bottom` or a numeric position
  Move { card: String, id: String, position: Position },
  Delete { card: String, id: String },
}

#[derive(Subcommand, Debug)]
pub enum StickerCommand {
  List { card: String },
  Show { card: String, id: String },
  Move {
    card: String,
    id: String,
    #[arg(long, allow_hyphen_values = true)]
    left: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    top: Option<f64>,
    #[arg(long)]
    rotation: Option<i32>,
  },
  Delete { card: String, id: String },
}

fn ensure_id(kind: &str, id: &str) -> Result<()> {
  if IdRule::is_valid(id) {
    Ok(())
  } else {
    Err(eyre!("'{}' is not a valid {} id (expected 24 hex characters)", id, kind))
  }
}

fn show<T: std::fmt::Debug>(label: &str, value: Option<T>) {
  match value {
    Some(v) => println!("{:<12} {:?}", label, v),
    None => println!("{:<12} -", label),
  }
}

fn show_text(label: &str, value: Option<String>) {
  println!("{:<12} {}", label, value.as_deref().unwrap_or("-"));
}

pub async fn run(command: Command, client: &TrelloClient, session: &Session) -> Result<()> {
  match command {
    Command::Member(cmd) => run_member(cmd, session).await,
    Command::Action(cmd) => run_action(cmd, session).await,
    Command::Attachment(cmd) => run_attachment(cmd, client, session).await,
    Command::Sticker(cmd) => run_sticker(cmd, client, session).await,
  }
}

async fn run_member(cmd: MemberCommand, session: &Session) -> Result<()> {
  let MemberCommand::Show { id } = cmd;
  let member = Member::new(&id, session)?;
  show_text("username", member.username().get().await?);
  show_text("full name", member.full_name().get().await?);
  show_text("initials", member.initials().get().await?);
  show_text("bio", member.bio().get().await?);
  show_text("url", member.url().get().await?);
  show("created", member.creation_date());
  Ok(())
}

async fn print_action(action: &Action) -> Result<()> {
  show_text("type", action.action_type().get().await?);
  show("date", action.date().get().await?);
  let creator = action.creator().get().await?;
  show_text("creator", creator.map(|m| m.to_string()));
  show_text("card", action.card_name().get().await?);
  show_text("text", action.text().get().await?);
  Ok(())
}

async fn run_action(cmd: ActionCommand, session: &Session) -> Result<()> {
  match cmd {
    ActionCommand::Show { id } => {
      ensure_id("action", &id)?;
      let action = Action::new(&id, session)?;
      print_action(&action).await
    }
    ActionCommand::Edit { id, text } => {
      ensure_id("action", &id)?;
      let action = Action::new(&id, session)?;
      action.text().set(Some(text))?.await?;
      info!(%id, "action text updated");
      print_action(&action).await
    }
    ActionCommand::Delete { id } => {
      ensure_id("action", &id)?;
      Action::new(&id, session)?.delete().await?;
      println!("deleted action {}", id);
      Ok(())
    }
  }
}

fn attachments(client: &TrelloClient, card: &str) -> Result<Arc<dyn Remote<AttachmentSnapshot>>> {
  ensure_id("card", card)?;
  Ok(Arc::new(client.card(card)))
}

async fn print_attachment(attachment: &Attachment) -> Result<()> {
  show_text("name", attachment.name().get().await?);
  show_text("url", attachment.url().get().await?);
  show_text("mime type", attachment.mime_type().get().await?);
  show("bytes", attachment.bytes().get().await?);
  show("position", attachment.position().get().await?);
  show("date", attachment.date().get().await?);
  let member = attachment.member().get().await?;
  show_text("member", member.map(|m| m.to_string()));
  Ok(())
}

async fn run_attachment(cmd: AttachmentCommand, client: &TrelloClient, session: &Session) -> Result<()> {
  match cmd {
    AttachmentCommand::List { card } => {
      ensure_id("card", &card)?;
      let endpoint = client.card(&card);
      let remote: Arc<dyn Remote<AttachmentSnapshot>> = Arc::new(endpoint.clone());
      for snapshot in endpoint.attachments().await? {
        let attachment = Attachment::from_snapshot(&snapshot, remote.clone(), session);
        println!("{}  {}", attachment.id(), attachment);
      }
      Ok(())
    }
    AttachmentCommand::Show { card, id } => {
      ensure_id("attachment", &id)?;
      let attachment = Attachment::new(&id, attachments(client, &card)?, session);
      print_attachment(&attachment).await
    }
    AttachmentCommand::Rename { card, id, name } => {
      ensure_id("attachment", &id)?;
      let attachment = Attachment::new(&id, attachments(client, &card)?, session);
      attachment.name().set(Some(name))?.await?;
      print_attachment(&attachment).await
    }
    AttachmentCommand::Move { card, id, position } => {
      ensure_id("attachment", &id)?;
      let attachment = Attachment::new(&id, attachments(client, &card)?, session);
      attachment.position().set(Some(position))?.await?;
      print_attachment(&attachment).await
    }
    AttachmentCommand::Delete { card, id } => {
      ensure_id("attachment", &id)?;
      Attachment::new(&id, attachments(client, &card)?, session)
        .delete()
        .await?;
      println!("deleted attachment {}", id);
      Ok(())
    }
  }
}

fn stickers(client: &TrelloClient, card: &str) -> Result<Arc<dyn Remote<StickerSnapshot>>> {
  ensure_id("card", card)?;
  Ok(Arc::new(client.card(card)))
}

async fn print_sticker(sticker: &Sticker) -> Result<()> {
  show_text("name", sticker.name().get().await?);
  show("left", sticker.left().get().await?);
  show("top", sticker.top().get().await?);
  show("rotation", sticker.rotation().get().await?);
  show("z-index", sticker.z_index().get().await?);
  show_text("image", sticker.image_url().get().await?);
  Ok(())
}

async fn run_sticker(cmd: StickerCommand, client: &TrelloClient, session: &Session) -> Result<()> {
  match cmd {
    StickerCommand::List { card } => {
      ensure_id("card", &card)?;
      let endpoint = client.card(&card);
      let remote: Arc<dyn Remote<StickerSnapshot>> = Arc::new(endpoint.clone());
      for snapshot in endpoint.stickers().await? {
        let sticker = Sticker::from_snapshot(&snapshot, remote.clone(), session);
        let name = sticker.name().peek()?;
        println!("{}  {}", sticker.id(), name.as_deref().unwrap_or("-"));
      }
      Ok(())
    }
    StickerCommand::Show { card, id } => {
      ensure_id("sticker", &id)?;
      print_sticker(&Sticker::new(&id, stickers(client, &card)?, session)).await
    }
    StickerCommand::Move {
      card,
      id,
      left,
      top,
      rotation,
    } => {
      ensure_id("sticker", &id)?;
      let sticker = Sticker::new(&id, stickers(client, &card)?, session);
      // All three writes land in one update.
      let mut pending = Vec::new();
      if left.is_some() {
        pending.push(sticker.left().set(left)?);
      }
      if top.is_some() {
        pending.push(sticker.top().set(top)?);
      }
      if rotation.is_some() {
        pending.push(sticker.rotation().set(rotation)?);
      }
      if pending.is_empty() {
        return Err(eyre!("Nothing to move: pass --left, --top or --rotation"));
      }
      futures::future::try_join_all(pending.into_iter().map(SubmitHandle::wait)).await?;
      print_sticker(&sticker).await
    }
    StickerCommand::Delete { card, id } => {
      ensure_id("sticker", &id)?;
      Sticker::new(&id, stickers(client, &card)?, session)
        .delete()
        .await?;
      println!("deleted sticker {}", id);
      Ok(())
    }
  }
}
