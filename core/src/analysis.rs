use std::fmt::Write as _;

use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};

use crate::models::NutritionAnalysis;

/// Image-based nutrition estimator.
///
/// A real provider sends the photo to a vision model and feeds its reply
/// through [`parse_analysis_response`]. Called synchronously; the server
/// holds the service lock for the duration of a call.
pub trait ImageAnalyzer: Send + Sync {
    fn analyze(&self, image: &[u8]) -> Result<NutritionAnalysis>;
}

/// Returns a fixed estimate for any non-empty image.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedAnalyzer;

impl ImageAnalyzer for SimulatedAnalyzer {
    fn analyze(&self, image: &[u8]) -> Result<NutritionAnalysis> {
        if image.is_empty() {
            bail!("Image is empty");
        }
        Ok(NutritionAnalysis {
            description: Some("Plate of food".to_string()),
            calories: 550.0,
            protein: 30.0,
            fiber: 8.0,
            carbs: Some(60.0),
            fat: Some(20.0),
            confidence: Some(0.85),
            source: Some("simulated".to_string()),
        })
    }
}

/// Pull the JSON object out of a model reply, tolerating prose or code
/// fences around it.
pub fn parse_analysis_response(text: &str) -> Result<NutritionAnalysis> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        bail!("No JSON object found in analysis response");
    };
    if end < start {
        bail!("No JSON object found in analysis response");
    }
    let mut analysis: NutritionAnalysis = serde_json::from_str(&text[start..=end])
        .context("Failed to parse analysis response")?;
    analysis.validate()?;
    analysis.confidence = analysis.confidence.map(|c| c.clamp(0.0, 1.0));
    Ok(analysis)
}

/// Lower-case hex SHA-256 of the image bytes.
#[must_use]
pub fn image_hash(bytes: &[u8]) -> String {
    to_hex(&Sha256::digest(bytes))
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}
