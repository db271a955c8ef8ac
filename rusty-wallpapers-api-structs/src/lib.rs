/// The subset of `GET /photos/random` response objects we care about.
///
/// Unsplash returns many more fields; they are ignored when deserializing.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RandomPhoto {
    #[serde(default)]
    pub id: String,
    pub urls: PhotoUrls,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PhotoUrls {
    pub full: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regular: Option<String>,
}

#[derive(Debug, serde::Deserialize, serde::Serialize)]
pub struct RandomPhotoQuery {
    pub orientation: Orientation,
    pub count: u32,
    pub collections: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
    Squarish,
}
