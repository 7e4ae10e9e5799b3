//! Single clip processing.

use std::path::Path;
use tracing::{info, warn};

use fitclip_media::{ClipEncoder, ClipOutput, ClipRequest};

use super::tasks::SkipReason;

/// Encode one validated request into `clips_dir`.
///
/// A failure is contained: it is logged and returned as a skip reason.
pub async fn process_single_clip(
    encoder: &dyn ClipEncoder,
    source: &Path,
    clips_dir: &Path,
    request: &ClipRequest,
) -> Result<ClipOutput, SkipReason> {
    let output_path = clips_dir.join(request.output_file_name());

    match encoder.encode(source, request, &output_path).await {
        Ok(output) => {
            info!(
                clip = %output.name,
                path = %output.path.display(),
                size_bytes = output.size_bytes,
                "Clip written"
            );
            Ok(output)
        }
        Err(e) => {
            warn!(
                clip = %request.name,
                start_s = request.start_s,
                end_s = request.end_s,
                error = %e,
                "Clip encode failed, skipping"
            );
            // Partial output from a failed encode is never reported
            if tokio::fs::remove_file(&output_path).await.is_ok() {
                info!(path = %output_path.display(), "Removed partial clip");
            }
            Err(SkipReason::EncodeFailed {
                message: e.to_string(),
            })
        }
    }
}
