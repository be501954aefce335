use std::path::Path;

use anyhow::Context;

use ht_domain::model::ModelProgress;
use ht_domain::triage::{ImageBlob, TriageInput};
use ht_engine::TriageEngine;

/// Assess one submission and print the result as JSON.
///
/// Returns `false` when no result could be produced.
pub async fn run(
    engine: &TriageEngine,
    text: Option<String>,
    image: Option<&Path>,
    offline: bool,
) -> anyhow::Result<bool> {
    let image = image.map(read_image).transpose()?;
    let input = match (text, image) {
        (Some(text), Some(image)) => TriageInput::multimodal(text, image),
        (text, Some(image)) => TriageInput::image(text, image),
        (Some(text), None) => TriageInput::text(text),
        (None, None) => anyhow::bail!("nothing to assess: pass --text and/or --image"),
    };

    if offline && !engine.enable_offline_mode().await {
        let reason = engine.state().last_error.unwrap_or_default();
        eprintln!("offline mode unavailable, using remote inference: {reason}");
    }

    match engine.run_triage(input).await {
        Some(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(true)
        }
        None => {
            let reason = engine
                .state()
                .last_error
                .unwrap_or_else(|| "triage failed".into());
            eprintln!("error: {reason}");
            Ok(false)
        }
    }
}

pub async fn history(engine: &TriageEngine, limit: Option<usize>) -> anyhow::Result<()> {
    let sessions = engine.history(limit).await;
    println!("{}", serde_json::to_string_pretty(&sessions)?);
    Ok(())
}

pub async fn unsynced(engine: &TriageEngine) -> anyhow::Result<()> {
    let sessions = engine.store().get_unsynced().await?;
    println!("{}", serde_json::to_string_pretty(&sessions)?);
    Ok(())
}

pub async fn sync(engine: &TriageEngine) -> anyhow::Result<()> {
    let synced = engine.sync_pending().await?;
    let remaining = engine.store().get_unsynced().await?.len();
    println!("synced {synced} session(s), {remaining} still pending");
    Ok(())
}

pub async fn clear(engine: &TriageEngine) -> anyhow::Result<()> {
    let count = engine.store().len().await?;
    engine.store().clear().await?;
    println!("removed {count} session(s)");
    Ok(())
}

/// Load the model, streaming progress to stderr.
pub async fn model_load(engine: &TriageEngine) -> anyhow::Result<bool> {
    let mut rx = engine.subscribe();
    let printer = tokio::spawn(async move {
        let mut last = ModelProgress::default();
        while rx.changed().await.is_ok() {
            let progress = rx.borrow_and_update().model_progress.clone();
            if progress != last {
                eprintln!(
                    "[{:>11}] {:>3.0}% {}",
                    progress.status.as_str(),
                    progress.progress * 100.0,
                    progress.text
                );
                last = progress;
            }
        }
    });

    let ready = engine.enable_offline_mode().await;
    printer.abort();

    let state = engine.state();
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(ready)
}

pub async fn model_status(engine: &TriageEngine) -> anyhow::Result<()> {
    let model = engine.model();
    let capable = model.check_capability().await;
    let status = serde_json::json!({
        "model_id": model.model_id(),
        "capable": capable,
        "status": model.status(),
        "progress": model.progress(),
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn read_image(path: &Path) -> anyhow::Result<ImageBlob> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".into());
    Ok(ImageBlob::new(bytes, filename, content_type(path)))
}

fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_from_extension() {
        assert_eq!(content_type(Path::new("a.PNG")), "image/png");
        assert_eq!(content_type(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(content_type(Path::new("a")), "application/octet-stream");
    }
}
