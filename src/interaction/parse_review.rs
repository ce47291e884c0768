//! The parse request pipeline: fetch two pages, extract, persist.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use futures::future::try_join_all;
use tracing::{Instrument, info, info_span, instrument, warn};

use crate::{
    base::{
        error::ApiError,
        types::{PageImage, ParseReviewRequest, ParsedReview, ParsedReviewUpsert, Session},
    },
    runtime::Runtime,
};

/// Parses the forest plot and risk of bias pages of a review and stores the result.
///
/// Both pages are downloaded concurrently. The risk of bias extraction is
/// seeded with the forest plot's study titles, so the two LLM calls run in order.
#[instrument(skip_all)]
pub async fn handle_parse_review(runtime: &Runtime, session: &Session, request: ParseReviewRequest) -> Result<ParsedReview, ApiError> {
    let pages = request.validate().ok_or(ApiError::MissingFields)?;

    info!(
        "Parsing review `{}` (forest plot page {}, risk of bias page {}).",
        pages.review_id, pages.forest_plot_page, pages.rob_graph_page
    );

    // Fetch both pages.

    let (forest_plot_images, rob_images) = tokio::try_join!(
        download_page_sections(runtime, session, &pages.review_id, pages.forest_plot_page),
        download_page_sections(runtime, session, &pages.review_id, pages.rob_graph_page),
    )?;

    // Extract.

    let forest_plot_data = runtime.llm.parse_forest_plot(&forest_plot_images, &runtime.config.forest_plot_directive).await?;
    let study_titles = forest_plot_data.study_titles();
    let rob_graph_data = runtime.llm.parse_risk_of_bias(&rob_images, &runtime.config.risk_of_bias_directive, &study_titles).await?;

    // Persist.

    let upsert = ParsedReviewUpsert {
        review_id: pages.review_id,
        forest_plot_page: pages.forest_plot_page,
        rob_graph_page: pages.rob_graph_page,
        forest_plot_data,
        rob_graph_data,
    };

    let stored = runtime
        .db
        .upsert_parsed_review(session, &upsert)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to save parsed data: {e:#}"))?;

    Ok(stored)
}

/// Downloads every section of a page, in section order, as base64 images.
///
/// A page with no sections (or whose lookup fails) is reported as not found.
/// Sections are downloaded concurrently.
#[instrument(skip(runtime, session))]
pub async fn download_page_sections(runtime: &Runtime, session: &Session, review_id: &str, page_number: u32) -> Result<Vec<PageImage>, ApiError> {
    let sections = match runtime.db.get_page_sections(session, review_id, page_number).await {
        Ok(sections) if !sections.is_empty() => sections,
        Ok(_) => return Err(ApiError::PageNotFound(page_number)),
        Err(err) => {
            warn!("Page lookup failed: {err:#}");
            return Err(ApiError::PageNotFound(page_number));
        }
    };

    let downloads = sections.into_iter().map(|section| {
        let span = info_span!("download_section", path = %section.image_path);

        async move {
            let section_label = section.section_number.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string());

            let bytes = runtime.storage.download(session, &section.image_path).await.map_err(|err| {
                warn!("Download failed: {err:#}");
                anyhow::anyhow!("Failed to download page {page_number} section {section_label}")
            })?;

            Ok::<_, ApiError>(encode_image(&bytes))
        }
        .instrument(span)
    });

    try_join_all(downloads).await
}

/// Encodes raw image bytes for an LLM request.
pub fn encode_image(bytes: &[u8]) -> PageImage {
    PageImage {
        media_type: sniff_media_type(bytes),
        data: STANDARD.encode(bytes),
    }
}

/// Identifies the image format from its magic bytes, defaulting to PNG.
pub fn sniff_media_type(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/png",
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_media_type() {
        assert_eq!(sniff_media_type(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A]), "image/png");
        assert_eq!(sniff_media_type(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(sniff_media_type(b"GIF89a"), "image/gif");
        assert_eq!(sniff_media_type(b"RIFF\x10\x00\x00\x00WEBPVP8 "), "image/webp");
        assert_eq!(sniff_media_type(b""), "image/png");
    }

    #[test]
    fn test_encode_image() {
        let image = encode_image(&[0xFF, 0xD8, 0xFF, 0xDB]);

        assert_eq!(image.media_type, "image/jpeg");
        assert_eq!(STANDARD.decode(&image.data).unwrap(), vec![0xFF, 0xD8, 0xFF, 0xDB]);
    }
}
