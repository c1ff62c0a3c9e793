//! Face search against an AWS Rekognition face collection.
//!
//! One `SearchFacesByImage` call per composite image, asking for the single
//! best match.

use crate::types::FaceMatch;
use async_trait::async_trait;
use aws_sdk_rekognition::error::DisplayErrorContext;
use aws_sdk_rekognition::operation::search_faces_by_image::SearchFacesByImageOutput;
use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::Image;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("face search failed: {0}")]
    Api(String),
    #[error("empty image")]
    EmptyImage,
}

/// Looks a composite face image up in a face collection.
#[async_trait]
pub trait FaceSearch: Send + Sync {
    /// `Ok(None)` means the search ran but found no face or no enrolled match.
    async fn search(&self, image: &[u8]) -> Result<Option<FaceMatch>, SearchError>;
}

/// Rekognition-backed face search.
pub struct RekognitionSearch {
    client: aws_sdk_rekognition::Client,
    collection_id: String,
    face_match_threshold: Option<f32>,
}

impl RekognitionSearch {
    pub fn new(
        client: aws_sdk_rekognition::Client,
        collection_id: impl Into<String>,
        face_match_threshold: Option<f32>,
    ) -> Self {
        Self {
            client,
            collection_id: collection_id.into(),
            face_match_threshold,
        }
    }

    /// Build a client from the default AWS credential and region chain.
    pub async fn from_env(
        collection_id: impl Into<String>,
        face_match_threshold: Option<f32>,
    ) -> Self {
        let sdk_config = aws_config::load_from_env().await;
        let client = aws_sdk_rekognition::Client::new(&sdk_config);
        Self::new(client, collection_id, face_match_threshold)
    }
}

#[async_trait]
impl FaceSearch for RekognitionSearch {
    async fn search(&self, image: &[u8]) -> Result<Option<FaceMatch>, SearchError> {
        if image.is_empty() {
            return Err(SearchError::EmptyImage);
        }
        tracing::info!(
            collection = %self.collection_id,
            bytes = image.len(),
            "face search started"
        );

        let output = self
            .client
            .search_faces_by_image()
            .collection_id(&self.collection_id)
            .set_face_match_threshold(self.face_match_threshold)
            .image(Image::builder().bytes(Blob::new(image.to_vec())).build())
            .max_faces(1)
            .send()
            .await
            .map_err(|e| SearchError::Api(DisplayErrorContext(e).to_string()))?;

        Ok(interpret(&output))
    }
}

/// Reduce a search response to the best match, if any.
pub fn interpret(output: &SearchFacesByImageOutput) -> Option<FaceMatch> {
    let searched_confidence = output.searched_face_confidence().unwrap_or(0.0);
    if searched_confidence <= 0.0 {
        tracing::info!("face search: no face in image");
        return None;
    }

    let Some(best) = output.face_matches().first() else {
        tracing::info!("face search: face not enrolled");
        return None;
    };
    let Some(face) = best.face() else {
        tracing::info!("face search: match without face record");
        return None;
    };
    let Some(face_id) = face.face_id() else {
        tracing::info!(similarity = ?best.similarity(), "face search: match without face id");
        return None;
    };

    tracing::info!(
        similarity = ?best.similarity(),
        confidence = ?face.confidence(),
        "face search: match"
    );

    Some(FaceMatch {
        face_id: face_id.to_string(),
        image_id: face.image_id().map(str::to_string),
        external_image_id: face.external_image_id().map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_rekognition::types::{Face, FaceMatch as RekognitionMatch};

    fn matched(face: Face, similarity: f32) -> RekognitionMatch {
        RekognitionMatch::builder().face(face).similarity(similarity).build()
    }

    #[test]
    fn test_interpret_match() {
        let output = SearchFacesByImageOutput::builder()
            .searched_face_confidence(99.0)
            .face_matches(matched(
                Face::builder()
                    .face_id("testFaceId")
                    .image_id("testImageId")
                    .external_image_id("externalImageId")
                    .confidence(98.0)
                    .build(),
                97.0,
            ))
            .build();

        assert_eq!(
            interpret(&output),
            Some(FaceMatch {
                face_id: "testFaceId".into(),
                image_id: Some("testImageId".into()),
                external_image_id: Some("externalImageId".into()),
            })
        );
    }

    #[test]
    fn test_interpret_missing_external_id_is_none() {
        let output = SearchFacesByImageOutput::builder()
            .searched_face_confidence(99.0)
            .face_matches(matched(
                Face::builder().face_id("testFaceId").image_id("testImageId").build(),
                97.0,
            ))
            .build();

        let result = interpret(&output).unwrap();
        assert_eq!(result.external_image_id, None);
    }

    #[test]
    fn test_interpret_no_searched_face() {
        let output = SearchFacesByImageOutput::builder()
            .searched_face_confidence(0.0)
            .build();
        assert_eq!(interpret(&output), None);
    }

    #[test]
    fn test_interpret_no_matches() {
        let output = SearchFacesByImageOutput::builder()
            .searched_face_confidence(99.0)
            .build();
        assert_eq!(interpret(&output), None);
    }

    #[test]
    fn test_interpret_match_without_face_id() {
        let output = SearchFacesByImageOutput::builder()
            .searched_face_confidence(80.0)
            .face_matches(matched(Face::builder().build(), 80.0))
            .build();
        assert_eq!(interpret(&output), None);
    }
}
