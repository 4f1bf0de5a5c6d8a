use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use teloxide::dispatching::UpdateHandler;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, InputFile, MessageId, ReplyParameters};
use teloxide::update_listeners::webhooks;
use teloxide::utils::command::BotCommands;
use tracing::{info, instrument, warn};

use crate::app::AppContext;
use crate::foundation::error::{TalkreelError, TalkreelResult};
use crate::pipeline::ReplySink;
use crate::render::compositor::MediaArtifact;
use crate::session::UserId;
use crate::transport::inbound::InboundMessage;
use crate::transport::replies;

/// How updates reach the bot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DeliveryMode {
    #[default]
    Polling,
    Webhook,
}

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase")]
pub enum BotCommand {
    Start,
    Help,
    Balance,
}

/// Sends the video note, then the reply text, into the originating chat.
#[derive(Clone, Debug)]
pub struct TelegramReplySink {
    bot: Bot,
    chat_id: ChatId,
    reply_to: MessageId,
}

impl TelegramReplySink {
    pub fn new(bot: Bot, chat_id: ChatId, reply_to: MessageId) -> Self {
        Self {
            bot,
            chat_id,
            reply_to,
        }
    }
}

#[async_trait]
impl ReplySink for TelegramReplySink {
    async fn deliver(&self, reply_text: &str, video: &MediaArtifact) -> TalkreelResult<()> {
        let note = InputFile::memory(video.video_bytes.clone()).file_name("reply.mp4");
        self.bot
            .send_video_note(self.chat_id, note)
            .reply_parameters(ReplyParameters::new(self.reply_to))
            .await
            .map_err(|e| TalkreelError::delivery(format!("send_video_note failed: {e}")))?;
        self.bot
            .send_message(self.chat_id, reply_text)
            .await
            .map_err(|e| TalkreelError::delivery(format!("send_message failed: {e}")))?;
        Ok(())
    }
}

/// Run the dispatcher until Ctrl-C, over long polling or an axum webhook listener.
pub async fn serve(ctx: Arc<AppContext>) -> TalkreelResult<()> {
    let cfg = ctx.config();
    let bot = Bot::new(&cfg.telegram_token);
    let mut dispatcher = Dispatcher::builder(bot.clone(), schema())
        .dependencies(dptree::deps![Arc::clone(&ctx)])
        .enable_ctrlc_handler()
        .build();

    match cfg.delivery {
        DeliveryMode::Polling => {
            info!("dispatching updates via long polling");
            dispatcher.dispatch().await;
        }
        DeliveryMode::Webhook => {
            let url = webhook_url(cfg.webhook_base_url.as_deref())?;
            let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
            info!(%addr, %url, "registering webhook");
            let listener = webhooks::axum(bot.clone(), webhooks::Options::new(addr, url))
                .await
                .map_err(|e| TalkreelError::config(format!("webhook registration failed: {e}")))?;
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("webhook listener error"),
                )
                .await;
            if let Err(e) = bot.delete_webhook().await {
                warn!(error = %e, "failed to deregister webhook");
            } else {
                info!("webhook deregistered");
            }
        }
    }
    info!("dispatcher stopped");
    Ok(())
}

fn schema() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<BotCommand>()
                .endpoint(on_command),
        )
        .branch(dptree::filter(|msg: Message| msg.voice().is_some()).endpoint(on_voice))
        .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(on_text))
}

/// `{base}/webhook`, the path the axum listener serves.
pub fn webhook_url(base: Option<&str>) -> TalkreelResult<reqwest::Url> {
    let base = base
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .ok_or_else(|| TalkreelError::config("WEBHOOK_BASE_URL is required for webhook delivery"))?;
    let raw = format!("{}/webhook", base.trim_end_matches('/'));
    reqwest::Url::parse(&raw)
        .map_err(|e| TalkreelError::config(format!("invalid webhook url '{raw}': {e}")))
}

fn sender_id(msg: &Message) -> UserId {
    msg.from
        .as_ref()
        .map(|u| UserId(u.id.0))
        .unwrap_or(UserId(msg.chat.id.0.unsigned_abs()))
}

async fn on_command(
    bot: Bot,
    msg: Message,
    cmd: BotCommand,
    ctx: Arc<AppContext>,
) -> ResponseResult<()> {
    let language = ctx.pipeline().settings().language;
    let text = match cmd {
        BotCommand::Start => replies::greeting(language).to_string(),
        BotCommand::Help => replies::help(language).to_string(),
        BotCommand::Balance => {
            let credits = ctx.pipeline().sessions().current_balance(sender_id(&msg));
            replies::balance(credits, language)
        }
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn on_text(bot: Bot, msg: Message, ctx: Arc<AppContext>) -> ResponseResult<()> {
    let text = msg.text().unwrap_or_default().to_string();
    respond(bot, msg, ctx, text).await
}

#[instrument(skip_all, fields(chat = msg.chat.id.0))]
async fn on_voice(bot: Bot, msg: Message, ctx: Arc<AppContext>) -> ResponseResult<()> {
    let Some(voice) = msg.voice() else {
        return Ok(());
    };
    let language = ctx.pipeline().settings().language;

    let file = bot.get_file(voice.file.id.clone()).await?;
    let mut audio = Vec::with_capacity(file.size as usize);
    bot.download_file(&file.path, &mut audio).await?;

    match ctx.transcriber().transcribe(audio, "voice.ogg").await {
        Ok(text) => {
            info!(chars = text.len(), "voice message transcribed");
            respond(bot, msg, ctx, text).await
        }
        Err(e) => {
            warn!(error = %e, "voice transcription failed");
            bot.send_message(msg.chat.id, replies::transcription_failed(language))
                .await?;
            Ok(())
        }
    }
}

async fn respond(bot: Bot, msg: Message, ctx: Arc<AppContext>, text: String) -> ResponseResult<()> {
    let inbound = InboundMessage::new(sender_id(&msg), msg.chat.id.0, msg.id.0, text);
    if let Err(e) = bot
        .send_chat_action(msg.chat.id, ChatAction::RecordVideoNote)
        .await
    {
        warn!(error = %e, "failed to send chat action");
    }

    let sink = TelegramReplySink::new(bot.clone(), msg.chat.id, msg.id);
    let report = ctx.pipeline().run(&inbound, &sink).await;
    if let Some(reason) = report.failure() {
        let language = ctx.pipeline().settings().language;
        bot.send_message(msg.chat.id, replies::failure_message(reason, language))
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_url_appends_path() {
        let url = webhook_url(Some("https://bot.example.com/")).unwrap();
        assert_eq!(url.as_str(), "https://bot.example.com/webhook");
    }

    #[test]
    fn webhook_url_requires_base() {
        assert!(matches!(webhook_url(None), Err(TalkreelError::Config(_))));
        assert!(matches!(webhook_url(Some("  ")), Err(TalkreelError::Config(_))));
        assert!(matches!(
            webhook_url(Some("not a url")),
            Err(TalkreelError::Config(_))
        ));
    }

    #[test]
    fn reply_sink_targets_originating_message() {
        let sink = TelegramReplySink::new(Bot::new("123:test"), ChatId(77), MessageId(9));
        assert_eq!(sink.chat_id, ChatId(77));
        assert_eq!(sink.reply_to, MessageId(9));
    }

    #[test]
    fn commands_parse_lowercase() {
        assert_eq!(BotCommand::parse("/balance", "talkreel_bot").ok(), Some(BotCommand::Balance));
        assert_eq!(BotCommand::parse("/start", "talkreel_bot").ok(), Some(BotCommand::Start));
        assert!(BotCommand::parse("/topup", "talkreel_bot").is_err());
    }
}
