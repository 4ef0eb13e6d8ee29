//! Narration subsystem: photo description and speech rendering
//!
//! Both operations are single forwards to the configured AI provider. The
//! completion choice is passed through untouched; audio is fully buffered.

use bytes::Bytes;
use insight_core::{choice_content, ProviderError, SpeechProvider, VisionProvider};
use serde_json::Value;

pub async fn analyze_photo(
    vision: &dyn VisionProvider,
    photo_url: &str,
) -> Result<Value, ProviderError> {
    let choice = vision.describe_image(photo_url).await?;
    tracing::info!(
        provider = vision.name(),
        photo_url,
        chars = choice_content(&choice).map(str::len).unwrap_or(0),
        "Photo analyzed"
    );
    Ok(choice)
}

pub async fn synthesize_speech(
    speech: &dyn SpeechProvider,
    text: &str,
) -> Result<Bytes, ProviderError> {
    let audio = speech.synthesize(text).await?;
    tracing::info!(
        provider = speech.name(),
        text_chars = text.len(),
        audio_bytes = audio.len(),
        "Speech generated"
    );
    Ok(audio)
}
