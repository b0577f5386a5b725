//! Inbound message schemas and the two-phase decode.
//!
//! [`Payload::parse`] classifies raw bytes as a typed JSON [`Envelope`] or as
//! plain text. [`Envelope::decode`] then checks the fields the message kind
//! cannot do without and produces an [`InboundMessage`]. Fields inside list
//! items are lenient and fall back to defaults.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::lenient;
use crate::artwork::ArtworkKind;

/// Scope name used when a listing covers the whole library.
pub const ALL_SCOPE: &str = "All";

/// Default text shown for missing now-playing and search fields.
const PLACEHOLDER: &str = "-";

/// Error classifying an inbound payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Neither a typed JSON object nor UTF-8 text.
    #[error("undecodable payload ({len} bytes)")]
    Undecodable { len: usize },
}

/// Error decoding a typed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("message `{kind}` is missing required field `{field}`")]
    MissingField { kind: String, field: &'static str },
}

/// First-phase classification of an inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A JSON object with a string `type` field.
    Envelope(Envelope),
    /// Anything else that is valid UTF-8.
    Text(String),
}

impl Payload {
    /// Classifies raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Undecodable`] if the bytes are neither a typed
    /// JSON object nor UTF-8 text.
    pub fn parse(bytes: &[u8]) -> Result<Self, PayloadError> {
        if let Ok(Value::Object(mut fields)) = serde_json::from_slice::<Value>(bytes) {
            if let Some(Value::String(kind)) = fields.remove("type") {
                return Ok(Self::Envelope(Envelope { kind, fields }));
            }
        }

        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(Self::Text(text.to_string())),
            Err(_) => Err(PayloadError::Undecodable { len: bytes.len() }),
        }
    }
}

/// A JSON message with its `type` tag split off.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    kind: String,
    fields: Map<String, Value>,
}

impl Envelope {
    /// Value of the `type` tag.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The artwork kind of a bulk artwork reply, read from the tag alone.
    pub fn bulk_artwork_kind(&self) -> Option<ArtworkKind> {
        match self.kind.as_str() {
            "artistArtworks" => Some(ArtworkKind::Artist),
            "albumArtworks" => Some(ArtworkKind::Album),
            _ => None,
        }
    }

    /// Decodes the envelope into a typed message.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::UnknownType`] for an unrecognized tag, and
    /// [`MessageError::MissingField`] when a field the kind requires is absent
    /// or has the wrong type.
    pub fn decode(self) -> Result<InboundMessage, MessageError> {
        let Envelope { kind, fields } = self;
        let missing = |field: &'static str| MessageError::MissingField {
            kind: kind.clone(),
            field,
        };

        match kind.as_str() {
            "genres" => {
                let body: ListBody<String> = body(fields);
                let genres = body.data.ok_or_else(|| missing("data"))?;
                Ok(InboundMessage::Genres(genres))
            }
            "artists" | "artistsBatch" => {
                let body: ScopedListBody<ArtistRecord> = body(fields);
                let artists = body.data.ok_or_else(|| missing("data"))?;
                let genre = body.genre.ok_or_else(|| missing("genre"))?;
                Ok(InboundMessage::Artists {
                    genre: normalize_scope(genre),
                    artists: artists.into_iter().map(Artist::from).collect(),
                    batch: kind == "artistsBatch",
                })
            }
            "albums" | "albumsBatch" => {
                let body: ScopedListBody<AlbumRecord> = body(fields);
                let albums = body.data.ok_or_else(|| missing("data"))?;
                let artist = match (body.artist, body.genre) {
                    (Some(artist), _) => normalize_scope(artist),
                    (None, Some(genre)) if genre.eq_ignore_ascii_case(ALL_SCOPE) => {
                        ALL_SCOPE.to_string()
                    }
                    _ => return Err(missing("artist")),
                };
                Ok(InboundMessage::Albums {
                    artist,
                    albums: albums.into_iter().map(Album::from).collect(),
                    batch: kind == "albumsBatch",
                })
            }
            "artistArtworks" | "albumArtworks" => {
                let kind_of = if kind == "artistArtworks" {
                    ArtworkKind::Artist
                } else {
                    ArtworkKind::Album
                };
                let body: ListBody<ArtworkRecord> = body(fields);
                let records = body.data.ok_or_else(|| missing("data"))?;
                let items = records
                    .into_iter()
                    .filter_map(|record| record.into_item(kind_of))
                    .collect();
                Ok(InboundMessage::Artwork {
                    kind: kind_of,
                    items,
                    bulk: true,
                })
            }
            "artistArtwork" | "albumArtwork" => {
                let kind_of = if kind == "artistArtwork" {
                    ArtworkKind::Artist
                } else {
                    ArtworkKind::Album
                };
                let record = single_artwork(fields);
                let item = record.into_item(kind_of).ok_or_else(|| {
                    missing(match kind_of {
                        ArtworkKind::Artist => "artistName",
                        ArtworkKind::Album => "albumName",
                    })
                })?;
                Ok(InboundMessage::Artwork {
                    kind: kind_of,
                    items: vec![item],
                    bulk: false,
                })
            }
            "songs" => {
                let body: SongsBody = body(fields);
                let records = body.data.ok_or_else(|| missing("data"))?;
                let album_name = body.album_name.ok_or_else(|| missing("albumName"))?;
                let mut songs: Vec<Song> = records.into_iter().map(Song::from).collect();
                songs.sort_by_key(|song| song.track_number);
                Ok(InboundMessage::Songs { album_name, songs })
            }
            "nowPlaying" => Ok(InboundMessage::NowPlaying(NowPlaying::from_fields(fields))),
            "progress" => {
                let body: ProgressBody = body(fields);
                Ok(InboundMessage::Progress {
                    current_time: body.current_time.ok_or_else(|| missing("currentTime"))?,
                    duration: body.duration.ok_or_else(|| missing("duration"))?,
                })
            }
            "playbackState" => {
                let body: PlaybackStateBody = body(fields);
                Ok(InboundMessage::PlaybackState {
                    is_playing: body.is_playing.ok_or_else(|| missing("isPlaying"))?,
                })
            }
            "searchResults" => {
                let body: SearchBody = body(fields);
                let records = body.songs.or(body.data).ok_or_else(|| missing("songs"))?;
                Ok(InboundMessage::SearchResults(
                    records.into_iter().map(SearchResult::from).collect(),
                ))
            }
            _ => Err(MessageError::UnknownType(kind.clone())),
        }
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Genres(Vec<String>),
    Artists {
        genre: String,
        artists: Vec<Artist>,
        batch: bool,
    },
    Albums {
        artist: String,
        albums: Vec<Album>,
        batch: bool,
    },
    /// One or more artwork payloads. `bulk` marks replies to a bulk fetch.
    Artwork {
        kind: ArtworkKind,
        items: Vec<ArtworkItem>,
        bulk: bool,
    },
    Songs {
        album_name: String,
        songs: Vec<Song>,
    },
    NowPlaying(NowPlaying),
    Progress {
        current_time: f64,
        duration: f64,
    },
    PlaybackState {
        is_playing: bool,
    },
    SearchResults(Vec<SearchResult>),
}

impl InboundMessage {
    /// Whether this message answers a tracked browse or search request.
    ///
    /// Incremental batches do not: more of the listing is still to come.
    #[must_use]
    pub fn finishes_request(&self) -> bool {
        matches!(
            self,
            Self::Genres(_)
                | Self::Artists { batch: false, .. }
                | Self::Albums { batch: false, .. }
                | Self::Songs { .. }
                | Self::SearchResults(_)
        )
    }
}

/// An artist entry of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artist {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artwork_base64: Option<String>,
    pub is_playing: bool,
}

/// An album entry of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: String,
    pub album_name: String,
    pub artist_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artwork_base64: Option<String>,
    pub is_playing: bool,
}

/// A song of an album listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub title: String,
    pub duration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artwork_base64: Option<String>,
    pub track_number: i64,
}

/// A search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub song_name: String,
    pub artist_name: String,
    pub album_name: String,
    /// Position in the companion's result list, usable with `playSongAtIndex`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
}

/// Now-playing metadata: the raw object plus the fields every consumer shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    pub song_name: String,
    pub artist_name: String,
    pub album_name: String,
    pub raw: Map<String, Value>,
}

impl NowPlaying {
    fn from_fields(raw: Map<String, Value>) -> Self {
        let text = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or(PLACEHOLDER)
                .to_string()
        };
        Self {
            song_name: text("songName"),
            artist_name: text("artistName"),
            album_name: text("albumName"),
            raw,
        }
    }
}

/// One artwork payload awaiting decode.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtworkItem {
    pub name: String,
    /// Base64 image bytes; `None` when the companion sent no usable payload.
    pub artwork_base64: Option<String>,
}

fn body<T: DeserializeOwned + Default>(fields: Map<String, Value>) -> T {
    serde_json::from_value(Value::Object(fields)).unwrap_or_default()
}

fn normalize_scope(scope: String) -> String {
    if scope.eq_ignore_ascii_case(ALL_SCOPE) {
        ALL_SCOPE.to_string()
    } else {
        scope
    }
}

fn single_artwork(mut fields: Map<String, Value>) -> ArtworkRecord {
    let nested = match fields.remove("data") {
        Some(Value::Object(data)) => Some(data),
        _ => None,
    };
    let top: ArtworkRecord = body(fields);
    match nested.map(body::<ArtworkRecord>) {
        Some(inner) => ArtworkRecord {
            artist_name: inner.artist_name.or(top.artist_name),
            album_name: inner.album_name.or(top.album_name),
            artwork_base64: inner.artwork_base64.or(top.artwork_base64),
        },
        None => top,
    }
}

#[derive(Default, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct ListBody<T> {
    #[serde(default, deserialize_with = "lenient::list")]
    data: Option<Vec<T>>,
}

#[derive(Default, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct ScopedListBody<T> {
    #[serde(default, deserialize_with = "lenient::list")]
    data: Option<Vec<T>>,
    #[serde(default, deserialize_with = "lenient::value")]
    genre: Option<String>,
    #[serde(default, deserialize_with = "lenient::value")]
    artist: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SongsBody {
    #[serde(default, deserialize_with = "lenient::list")]
    data: Option<Vec<SongRecord>>,
    #[serde(default, deserialize_with = "lenient::value")]
    album_name: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressBody {
    #[serde(default, deserialize_with = "lenient::float")]
    current_time: Option<f64>,
    #[serde(default, deserialize_with = "lenient::float")]
    duration: Option<f64>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaybackStateBody {
    #[serde(default, deserialize_with = "lenient::value")]
    is_playing: Option<bool>,
}

#[derive(Default, Deserialize)]
struct SearchBody {
    #[serde(default, deserialize_with = "lenient::list")]
    songs: Option<Vec<SearchRecord>>,
    #[serde(default, deserialize_with = "lenient::list")]
    data: Option<Vec<SearchRecord>>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtistRecord {
    #[serde(default, deserialize_with = "lenient::value")]
    name: String,
    #[serde(default, deserialize_with = "lenient::value")]
    artwork_base64: Option<String>,
    #[serde(default, deserialize_with = "lenient::value")]
    is_playing: bool,
}

impl From<ArtistRecord> for Artist {
    fn from(record: ArtistRecord) -> Self {
        Self {
            name: record.name,
            artwork_base64: record.artwork_base64,
            is_playing: record.is_playing,
        }
    }
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlbumRecord {
    #[serde(default, deserialize_with = "lenient::id")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient::value")]
    album_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::value")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient::value")]
    artist_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::value")]
    artist: Option<String>,
    #[serde(default, deserialize_with = "lenient::value")]
    artwork_base64: Option<String>,
    #[serde(default, deserialize_with = "lenient::value")]
    is_playing: bool,
}

impl From<AlbumRecord> for Album {
    fn from(record: AlbumRecord) -> Self {
        Self {
            id: record.id.unwrap_or_default(),
            album_name: record.album_name.or(record.name).unwrap_or_default(),
            artist_name: record.artist_name.or(record.artist).unwrap_or_default(),
            artwork_base64: record.artwork_base64,
            is_playing: record.is_playing,
        }
    }
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SongRecord {
    #[serde(default, deserialize_with = "lenient::id")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient::value")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient::duration")]
    duration: Option<String>,
    #[serde(default, deserialize_with = "lenient::value")]
    artwork_base64: Option<String>,
    #[serde(default, deserialize_with = "lenient::int")]
    track_number: Option<i64>,
}

impl From<SongRecord> for Song {
    fn from(record: SongRecord) -> Self {
        Self {
            id: record.id.unwrap_or_default(),
            title: record.title.unwrap_or_else(|| "Unknown".to_string()),
            duration: record.duration.unwrap_or_default(),
            artwork_base64: record.artwork_base64,
            track_number: record.track_number.unwrap_or(0),
        }
    }
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRecord {
    #[serde(default, deserialize_with = "lenient::id")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient::value")]
    song_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::value")]
    artist_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::value")]
    album_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::int")]
    index: Option<i64>,
}

impl From<SearchRecord> for SearchResult {
    fn from(record: SearchRecord) -> Self {
        let text = |value: Option<String>| value.unwrap_or_else(|| PLACEHOLDER.to_string());
        Self {
            id: record.id.unwrap_or_default(),
            song_name: text(record.song_name),
            artist_name: text(record.artist_name),
            album_name: text(record.album_name),
            index: record.index,
        }
    }
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtworkRecord {
    #[serde(default, deserialize_with = "lenient::value")]
    artist_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::value")]
    album_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::value")]
    artwork_base64: Option<String>,
}

impl ArtworkRecord {
    fn into_item(self, kind: ArtworkKind) -> Option<ArtworkItem> {
        let name = match kind {
            ArtworkKind::Artist => self.artist_name,
            ArtworkKind::Album => self.album_name,
        }?;
        Some(ArtworkItem {
            name,
            artwork_base64: self.artwork_base64.filter(|b64| !b64.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> Result<InboundMessage, MessageError> {
        match Payload::parse(json.as_bytes()).unwrap() {
            Payload::Envelope(envelope) => envelope.decode(),
            Payload::Text(text) => panic!("expected envelope, got text {text:?}"),
        }
    }

    #[test]
    fn plain_text_is_classified_as_text() {
        assert_eq!(
            Payload::parse(b"connected").unwrap(),
            Payload::Text("connected".into())
        );
        // JSON without a type tag falls through to text
        assert!(matches!(
            Payload::parse(br#"{"data":[]}"#).unwrap(),
            Payload::Text(_)
        ));
    }

    #[test]
    fn invalid_utf8_is_undecodable() {
        let err = Payload::parse(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, PayloadError::Undecodable { len: 3 }));
    }

    #[test]
    fn albums_scoped_to_artist() {
        let msg = decode(
            r#"{"type":"albums","data":[{"id":"1","albumName":"A","artistName":"B"}],"artist":"B"}"#,
        )
        .unwrap();
        let InboundMessage::Albums {
            artist,
            albums,
            batch,
        } = msg
        else {
            panic!("expected albums");
        };
        assert_eq!(artist, "B");
        assert!(!batch);
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].album_name, "A");
        assert_eq!(albums[0].artist_name, "B");
    }

    #[test]
    fn album_fields_fall_back_to_short_names() {
        let msg = decode(
            r#"{"type":"albumsBatch","genre":"ALL","data":[{"id":7,"name":"X","artist":"Y"}]}"#,
        )
        .unwrap();
        let InboundMessage::Albums {
            artist,
            albums,
            batch,
        } = msg
        else {
            panic!("expected albums");
        };
        assert_eq!(artist, ALL_SCOPE);
        assert!(batch);
        assert_eq!(albums[0].id, "7");
        assert_eq!(albums[0].album_name, "X");
        assert_eq!(albums[0].artist_name, "Y");
    }

    #[test]
    fn albums_without_scope_are_rejected() {
        let err = decode(r#"{"type":"albums","data":[],"genre":"Jazz"}"#).unwrap_err();
        assert_eq!(
            err,
            MessageError::MissingField {
                kind: "albums".into(),
                field: "artist"
            }
        );
    }

    #[test]
    fn artist_genre_is_normalized() {
        let msg = decode(
            r#"{"type":"artists","genre":"all","data":[{"name":"N","isPlaying":"yes"},42]}"#,
        )
        .unwrap();
        let InboundMessage::Artists { genre, artists, .. } = msg else {
            panic!("expected artists");
        };
        assert_eq!(genre, "All");
        // Non-record items are dropped; wrong-typed fields default
        assert_eq!(artists.len(), 1);
        assert!(!artists[0].is_playing);
    }

    #[test]
    fn songs_default_and_sort_by_track() {
        let msg = decode(
            r#"{"type":"songs","albumName":"A","data":[
                {"id":"b","title":"Two","duration":"3:00","trackNumber":2},
                {"id":"c","duration":185},
                {"id":"a","title":"One","trackNumber":1.0}
            ]}"#,
        )
        .unwrap();
        let InboundMessage::Songs { album_name, songs } = msg else {
            panic!("expected songs");
        };
        assert_eq!(album_name, "A");
        let ids: Vec<_> = songs.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
        assert_eq!(songs[0].title, "Unknown");
        assert_eq!(songs[0].duration, "3:05");
        assert_eq!(songs[0].track_number, 0);
    }

    #[test]
    fn songs_require_album_name() {
        let err = decode(r#"{"type":"songs","data":[]}"#).unwrap_err();
        assert!(matches!(err, MessageError::MissingField { field: "albumName", .. }));
    }

    #[test]
    fn progress_accepts_integers() {
        assert_eq!(
            decode(r#"{"type":"progress","currentTime":65,"duration":200}"#).unwrap(),
            InboundMessage::Progress {
                current_time: 65.0,
                duration: 200.0
            }
        );
    }

    #[test]
    fn single_artwork_accepts_nested_data() {
        let msg = decode(r#"{"type":"albumArtwork","data":{"albumName":"A","artworkBase64":"Zm9v"}}"#)
            .unwrap();
        assert_eq!(
            msg,
            InboundMessage::Artwork {
                kind: ArtworkKind::Album,
                items: vec![ArtworkItem {
                    name: "A".into(),
                    artwork_base64: Some("Zm9v".into())
                }],
                bulk: false,
            }
        );
    }

    #[test]
    fn bulk_artwork_skips_items_without_name() {
        let msg = decode(
            r#"{"type":"artistArtworks","data":[{"artistName":"A","artworkBase64":"x"},{"artworkBase64":"y"}]}"#,
        )
        .unwrap();
        let InboundMessage::Artwork { items, bulk, .. } = msg else {
            panic!("expected artwork");
        };
        assert!(bulk);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "A");
    }

    #[test]
    fn now_playing_keeps_raw_object() {
        let msg = decode(r#"{"type":"nowPlaying","songName":"S","position":12}"#).unwrap();
        let InboundMessage::NowPlaying(info) = msg else {
            panic!("expected now playing");
        };
        assert_eq!(info.song_name, "S");
        assert_eq!(info.artist_name, "-");
        assert_eq!(info.raw["position"], 12);
    }

    #[test]
    fn search_results_fall_back_to_data() {
        let msg = decode(r#"{"type":"searchResults","data":[{"id":1,"songName":"S","index":0}]}"#)
            .unwrap();
        let InboundMessage::SearchResults(results) = msg else {
            panic!("expected results");
        };
        assert_eq!(results[0].id, "1");
        assert_eq!(results[0].album_name, "-");
        assert_eq!(results[0].index, Some(0));
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert_eq!(
            decode(r#"{"type":"lyrics"}"#).unwrap_err(),
            MessageError::UnknownType("lyrics".into())
        );
    }
}
