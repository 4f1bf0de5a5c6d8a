//! Canned user-facing texts. Raw error details never reach the chat.

use crate::pipeline::FailureReason;
use crate::speech::Language;

pub fn failure_message(reason: FailureReason, language: Language) -> &'static str {
    use FailureReason::*;
    match language {
        Language::English => match reason {
            NoCredit => "You have run out of credits. Check /balance to see what is left.",
            EmptyInput => "I did not catch anything to answer. Send me some text or a voice message.",
            Backend => "The assistant is not responding right now. Please try again in a minute.",
            Synthesis => "I could not voice my answer. Please try again.",
            Render => "I could not put the video together. Please try again.",
            Delivery => "I could not send the video. Please try again.",
        },
        Language::Russian => match reason {
            NoCredit => "У вас закончились кредиты. Проверить остаток: /balance",
            EmptyInput => "Я ничего не услышал. Пришлите текст или голосовое сообщение.",
            Backend => "Ассистент сейчас не отвечает. Попробуйте через минуту.",
            Synthesis => "Не удалось озвучить ответ. Попробуйте ещё раз.",
            Render => "Не удалось собрать видео. Попробуйте ещё раз.",
            Delivery => "Не удалось отправить видео. Попробуйте ещё раз.",
        },
    }
}

pub fn greeting(language: Language) -> &'static str {
    match language {
        Language::English => {
            "Hi! Send me a text or a voice message and I will answer with a short video."
        }
        Language::Russian => {
            "Привет! Пришли мне текст или голосовое сообщение, и я отвечу коротким видео."
        }
    }
}

pub fn help(language: Language) -> &'static str {
    match language {
        Language::English => {
            "Send a text or voice message to get a spoken video reply. Each reply costs one credit.\n\
             /start - greeting\n/help - this message\n/balance - remaining credits"
        }
        Language::Russian => {
            "Отправь текст или голосовое сообщение, и получишь видео с озвученным ответом. \
             Каждый ответ стоит один кредит.\n\
             /start - приветствие\n/help - эта справка\n/balance - остаток кредитов"
        }
    }
}

pub fn balance(credits: u64, language: Language) -> String {
    match language {
        Language::English => format!("Credits left: {credits}"),
        Language::Russian => format!("Осталось кредитов: {credits}"),
    }
}

pub fn transcription_failed(language: Language) -> &'static str {
    match language {
        Language::English => "I could not make out your voice message. Please try again.",
        Language::Russian => "Не удалось распознать голосовое сообщение. Попробуйте ещё раз.",
    }
}
