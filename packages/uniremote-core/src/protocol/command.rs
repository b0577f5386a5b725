//! Outbound commands.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// An instruction for the companion.
///
/// Rendered on the wire by [`fmt::Display`] as `verb` or `verb:argument`.
/// Arguments are passed through verbatim and may themselves contain `:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    GetGenres,
    GetArtistsForGenre(String),
    GetArtistsBatchForGenre(String),
    GetAllArtistsBatch,
    GetArtistArtwork(String),
    GetAllArtistArtworks,
    GetAlbumsForArtist(String),
    GetAllAlbumsBatch,
    GetAlbumArtwork(String),
    GetAllAlbumArtworks,
    GetSongsForAlbum(String),
    PlaySong(String),
    PlaySongAtIndex(usize),
    PlayAlbum(String),
    PlayArtist(String),
    PlayGenre(String),
    AddSongToQueue(String),
    Search(String),
    CancelBatchRequest,
    Play,
    Pause,
    Next,
    Previous,
}

impl Command {
    /// Returns the verb part of the wire form.
    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            Self::GetGenres => "getGenres",
            Self::GetArtistsForGenre(_) => "getArtistsForGenre",
            Self::GetArtistsBatchForGenre(_) => "getArtistsBatchForGenre",
            Self::GetAllArtistsBatch => "getAllArtistsBatch",
            Self::GetArtistArtwork(_) => "getArtistArtwork",
            Self::GetAllArtistArtworks => "getAllArtistArtworks",
            Self::GetAlbumsForArtist(_) => "getAlbumsForArtist",
            Self::GetAllAlbumsBatch => "getAllAlbumsBatch",
            Self::GetAlbumArtwork(_) => "getAlbumArtwork",
            Self::GetAllAlbumArtworks => "getAllAlbumArtworks",
            Self::GetSongsForAlbum(_) => "getSongsForAlbum",
            Self::PlaySong(_) => "playSong",
            Self::PlaySongAtIndex(_) => "playSongAtIndex",
            Self::PlayAlbum(_) => "playAlbum",
            Self::PlayArtist(_) => "playArtist",
            Self::PlayGenre(_) => "playGenre",
            Self::AddSongToQueue(_) => "addSongToQueue",
            Self::Search(_) => "search",
            Self::CancelBatchRequest => "cancelBatchRequest",
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Next => "next",
            Self::Previous => "previous",
        }
    }

    /// Whether the companion answers this command with a listing that ends a
    /// visible "request in progress" state.
    #[must_use]
    pub fn is_tracked_request(&self) -> bool {
        matches!(
            self,
            Self::GetGenres
                | Self::GetArtistsForGenre(_)
                | Self::GetAlbumsForArtist(_)
                | Self::GetSongsForAlbum(_)
                | Self::Search(_)
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = self.verb();
        match self {
            Self::GetArtistsForGenre(arg)
            | Self::GetArtistsBatchForGenre(arg)
            | Self::GetArtistArtwork(arg)
            | Self::GetAlbumsForArtist(arg)
            | Self::GetAlbumArtwork(arg)
            | Self::GetSongsForAlbum(arg)
            | Self::PlaySong(arg)
            | Self::PlayAlbum(arg)
            | Self::PlayArtist(arg)
            | Self::PlayGenre(arg)
            | Self::AddSongToQueue(arg)
            | Self::Search(arg) => write!(f, "{}:{}", verb, arg),
            Self::PlaySongAtIndex(index) => write!(f, "{}:{}", verb, index),
            _ => f.write_str(verb),
        }
    }
}

/// Error parsing a command string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    #[error("unknown command verb: {0}")]
    Unknown(String),
    #[error("command `{0}` requires an argument")]
    MissingArgument(&'static str),
    #[error("command `{0}` takes no argument")]
    UnexpectedArgument(&'static str),
    #[error("invalid song index: {0}")]
    InvalidIndex(String),
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (verb, arg) = match s.split_once(':') {
            Some((verb, arg)) => (verb, Some(arg)),
            None => (s, None),
        };

        let bare = |command: Command| match arg {
            None => Ok(command),
            Some(_) => Err(CommandParseError::UnexpectedArgument(command.verb())),
        };
        let with_arg = |verb: &'static str, build: fn(String) -> Command| match arg {
            Some(arg) => Ok(build(arg.to_string())),
            None => Err(CommandParseError::MissingArgument(verb)),
        };

        match verb {
            "getGenres" => bare(Self::GetGenres),
            "getArtistsForGenre" => with_arg("getArtistsForGenre", Self::GetArtistsForGenre),
            "getArtistsBatchForGenre" => {
                with_arg("getArtistsBatchForGenre", Self::GetArtistsBatchForGenre)
            }
            "getAllArtistsBatch" => bare(Self::GetAllArtistsBatch),
            "getArtistArtwork" => with_arg("getArtistArtwork", Self::GetArtistArtwork),
            "getAllArtistArtworks" => bare(Self::GetAllArtistArtworks),
            "getAlbumsForArtist" => with_arg("getAlbumsForArtist", Self::GetAlbumsForArtist),
            "getAllAlbumsBatch" => bare(Self::GetAllAlbumsBatch),
            "getAlbumArtwork" => with_arg("getAlbumArtwork", Self::GetAlbumArtwork),
            "getAllAlbumArtworks" => bare(Self::GetAllAlbumArtworks),
            "getSongsForAlbum" => with_arg("getSongsForAlbum", Self::GetSongsForAlbum),
            "playSong" => with_arg("playSong", Self::PlaySong),
            "playSongAtIndex" => {
                let arg = arg.ok_or(CommandParseError::MissingArgument("playSongAtIndex"))?;
                arg.trim()
                    .parse()
                    .map(Self::PlaySongAtIndex)
                    .map_err(|_| CommandParseError::InvalidIndex(arg.to_string()))
            }
            "playAlbum" => with_arg("playAlbum", Self::PlayAlbum),
            "playArtist" => with_arg("playArtist", Self::PlayArtist),
            "playGenre" => with_arg("playGenre", Self::PlayGenre),
            "addSongToQueue" => with_arg("addSongToQueue", Self::AddSongToQueue),
            "search" => with_arg("search", Self::Search),
            "cancelBatchRequest" => bare(Self::CancelBatchRequest),
            "play" => bare(Self::Play),
            "pause" => bare(Self::Pause),
            "next" => bare(Self::Next),
            "previous" => bare(Self::Previous),
            other => Err(CommandParseError::Unknown(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_wire_strings() {
        assert_eq!(Command::GetGenres.to_string(), "getGenres");
        assert_eq!(Command::PlaySong("42".into()).to_string(), "playSong:42");
        assert_eq!(Command::PlaySongAtIndex(3).to_string(), "playSongAtIndex:3");
        assert_eq!(
            Command::GetArtistsForGenre("Jazz".into()).to_string(),
            "getArtistsForGenre:Jazz"
        );
        assert_eq!(Command::CancelBatchRequest.to_string(), "cancelBatchRequest");
    }

    #[test]
    fn argument_may_contain_colons() {
        let cmd: Command = "getSongsForAlbum:Live: 1999".parse().unwrap();
        assert_eq!(cmd, Command::GetSongsForAlbum("Live: 1999".into()));
        assert_eq!(cmd.to_string(), "getSongsForAlbum:Live: 1999");
    }

    #[test]
    fn rejects_malformed_commands() {
        assert_eq!(
            "dance".parse::<Command>(),
            Err(CommandParseError::Unknown("dance".into()))
        );
        assert_eq!(
            "playSong".parse::<Command>(),
            Err(CommandParseError::MissingArgument("playSong"))
        );
        assert_eq!(
            "play:now".parse::<Command>(),
            Err(CommandParseError::UnexpectedArgument("play"))
        );
        assert!(matches!(
            "playSongAtIndex:two".parse::<Command>(),
            Err(CommandParseError::InvalidIndex(_))
        ));
    }

    #[test]
    fn tracked_requests_are_browse_and_search() {
        assert!(Command::GetGenres.is_tracked_request());
        assert!(Command::Search("x".into()).is_tracked_request());
        assert!(!Command::Play.is_tracked_request());
        assert!(!Command::GetAllAlbumArtworks.is_tracked_request());
    }
}
