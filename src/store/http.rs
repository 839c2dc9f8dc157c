//! REST client for the labeling server.

use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::error::{StoreError, StoreResult};
use crate::model::{
    ClassId, ExtractFramesRequest, ExtractFramesSummary, FilterBoxesRequest, FilterBoxesSummary,
    ImageListing, SaveRequest, StoredAnnotations,
};
use crate::tasks::{TaskId, TaskKind, TaskProgress};

use super::{AnnotationStore, ExportSummary};

/// Blocking HTTP implementation of [`AnnotationStore`].
#[derive(Debug, Clone)]
pub struct HttpStore {
    base: Url,
    client: Client,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct TaskStarted {
    task_id: String,
}

/// Box as the save route expects it: top-left corner and size in pixels.
#[derive(Debug, Serialize)]
struct PixelBox {
    class: ClassId,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

/// Body of `POST /api/annotate/save`. The server normalizes with the
/// given image size itself.
#[derive(Debug, Serialize)]
struct SaveBody<'a> {
    filename: &'a str,
    annotations: Vec<PixelBox>,
    image_width: u32,
    image_height: u32,
}

impl<'a> SaveBody<'a> {
    fn from_request(request: &'a SaveRequest) -> Self {
        let dims = request.dimensions();
        let annotations = request
            .annotations
            .iter()
            .map(|n| {
                let b = n.to_pixels(dims);
                PixelBox {
                    class: b.class_id,
                    x: b.x,
                    y: b.y,
                    width: b.width,
                    height: b.height,
                }
            })
            .collect();
        Self {
            filename: &request.filename,
            annotations,
            image_width: request.image_width,
            image_height: request.image_height,
        }
    }
}

impl HttpStore {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> StoreResult<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| StoreError::transport(format!("Invalid server URL {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::transport(format!(
                "Server URL {base_url} cannot be used as a base"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::transport(format!("Failed to build HTTP client: {e}")))?;
        log::debug!("HTTP store for {} (timeout {:?})", base, timeout);
        Ok(Self { base, client })
    }

    /// Create a client from the server section of the config.
    pub fn from_config(config: &ServerConfig) -> StoreResult<Self> {
        Self::new(&config.base_url, config.timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Build an endpoint URL. `name` is split on `/` and every part is
    /// percent-encoded as its own path segment.
    fn url(&self, route: &[&str], name: Option<&str>) -> StoreResult<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::transport("Server URL cannot be used as a base"))?;
            segments.pop_if_empty().extend(route);
            if let Some(name) = name {
                segments.extend(name.split('/'));
            }
        }
        Ok(url)
    }

    fn send(&self, request: RequestBuilder) -> StoreResult<Response> {
        let response = request
            .send()
            .map_err(|e| StoreError::transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or_else(|_| {
                if body.is_empty() {
                    status.canonical_reason().unwrap_or("").to_string()
                } else {
                    body
                }
            });
        Err(StoreError::status(status.as_u16(), message))
    }

    fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> StoreResult<T> {
        let text = self
            .send(request)?
            .text()
            .map_err(|e| StoreError::transport(e.to_string()))?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl AnnotationStore for HttpStore {
    fn list_images(&self) -> StoreResult<ImageListing> {
        let url = self.url(&["api", "annotate", "images"], None)?;
        log::trace!("GET {}", url);
        self.send_json(self.client.get(url))
    }

    fn get_image(&self, name: &str) -> StoreResult<Vec<u8>> {
        let url = self.url(&["api", "annotate", "image"], Some(name))?;
        log::trace!("GET {}", url);
        let bytes = self
            .send(self.client.get(url))?
            .bytes()
            .map_err(|e| StoreError::transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn get_annotations(&self, name: &str) -> StoreResult<StoredAnnotations> {
        let url = self.url(&["api", "annotate", "annotations"], Some(name))?;
        log::trace!("GET {}", url);
        self.send_json(self.client.get(url))
    }

    fn save_annotations(&self, request: &SaveRequest) -> StoreResult<()> {
        let url = self.url(&["api", "annotate", "save"], None)?;
        log::debug!(
            "Saving {} boxes for {}",
            request.annotations.len(),
            request.filename
        );
        self.send(self.client.post(url).json(&SaveBody::from_request(request)))?;
        Ok(())
    }

    fn delete_image(&self, name: &str) -> StoreResult<()> {
        let url = self.url(&["api", "annotate", "image"], Some(name))?;
        log::debug!("DELETE {}", url);
        self.send(self.client.delete(url))?;
        Ok(())
    }

    fn start_task(&self, task: &TaskKind) -> StoreResult<TaskId> {
        task.validate()
            .map_err(|message| StoreError::status(400, message))?;
        let route: Vec<&str> = task.endpoint().split('/').filter(|s| !s.is_empty()).collect();
        let url = self.url(&route, None)?;
        log::info!("Starting {} task", task.name());
        let started: TaskStarted =
            self.send_json(self.client.post(url).json(&task.request_body()))?;
        Ok(TaskId(started.task_id))
    }

    fn task_progress(&self, id: &TaskId) -> StoreResult<TaskProgress> {
        let url = self.url(&["api", "progress"], Some(&id.0))?;
        self.send_json(self.client.get(url))
    }

    fn export_dataset(&self, files: Option<&[String]>) -> StoreResult<ExportSummary> {
        let url = self.url(&["api", "annotate", "export"], None)?;
        let body = serde_json::json!({ "files": files });
        log::info!("Exporting dataset");
        self.send_json(self.client.post(url).json(&body))
    }

    fn filter_boxes(&self, request: &FilterBoxesRequest) -> StoreResult<FilterBoxesSummary> {
        request
            .validate()
            .map_err(|message| StoreError::status(400, message))?;
        let url = self.url(&["api", "annotate", "filter-extreme-boxes"], None)?;
        log::info!(
            "🔷 Filtering boxes outside {}..{} px",
            request.min_size,
            request.max_size
        );
        self.send_json(self.client.post(url).json(request))
    }

    fn extract_frames(
        &self,
        request: &ExtractFramesRequest,
    ) -> StoreResult<ExtractFramesSummary> {
        request
            .validate()
            .map_err(|message| StoreError::status(400, message))?;
        let url = self.url(&["api", "annotate", "extract_frames"], None)?;
        log::info!(
            "📹 Extracting frames every {}s (max {} per video)",
            request.interval,
            request.max_frames
        );
        self.send_json(self.client.post(url).json(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoundingBox, ImageDimensions};

    fn store(base: &str) -> HttpStore {
        HttpStore::new(base, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_url_encodes_names() {
        let s = store("http://localhost:5000");
        let url = s
            .url(&["api", "annotate", "image"], Some("lot 1/img#2.jpg"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/api/annotate/image/lot%201/img%232.jpg"
        );
    }

    #[test]
    fn test_url_keeps_base_path() {
        let s = store("http://inspection/labeler/");
        let url = s.url(&["api", "annotate", "images"], None).unwrap();
        assert_eq!(url.as_str(), "http://inspection/labeler/api/annotate/images");
    }

    #[test]
    fn test_save_body_is_pixel_space() {
        let dims = ImageDimensions::new(1000, 800);
        let bbox = BoundingBox::new(ClassId::Defect, 100.0, 100.0, 200.0, 150.0).unwrap();
        let request = SaveRequest::from_pixels("a.jpg", &[bbox], dims);

        let json = serde_json::to_value(SaveBody::from_request(&request)).unwrap();
        assert_eq!(json["filename"], "a.jpg");
        assert_eq!(json["image_width"], 1000);
        assert_eq!(json["image_height"], 800);
        let ann = &json["annotations"][0];
        assert_eq!(ann["class"], 1);
        assert!(ann.get("x_center").is_none());
        let px = |key: &str| ann[key].as_f64().unwrap();
        assert!((px("x") - 100.0).abs() < 0.01);
        assert!((px("y") - 100.0).abs() < 0.01);
        assert!((px("width") - 200.0).abs() < 0.01);
        assert!((px("height") - 150.0).abs() < 0.01);
    }

    #[test]
    fn test_invalid_base() {
        assert!(matches!(
            HttpStore::new("not a url", Duration::from_secs(1)),
            Err(StoreError::Transport(_))
        ));
        assert!(HttpStore::new("mailto:someone@example.com", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_invalid_filter_rejected_locally() {
        let s = store("http://127.0.0.1:9");
        assert!(matches!(
            s.filter_boxes(&FilterBoxesRequest::new(800, 50)),
            Err(StoreError::Status { status: 400, .. })
        ));
        let request = ExtractFramesRequest {
            interval: 0,
            max_frames: 100,
        };
        assert!(matches!(
            s.extract_frames(&request),
            Err(StoreError::Status { status: 400, .. })
        ));
    }

    #[test]
    fn test_invalid_task_rejected_locally() {
        let s = store("http://127.0.0.1:9");
        let task = TaskKind::DetectDuplicates {
            target: crate::tasks::TaskTarget::all(),
            threshold: 100,
        };
        assert!(matches!(
            s.start_task(&task),
            Err(StoreError::Status { status: 400, .. })
        ));
    }
}
