//! Tag and cover-art reader backed by `lofty`.

use std::path::Path;

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::prelude::Accessor;
use lofty::read_from_path;
use lofty::tag::{ItemKey, Tag};

use crate::model::TrackMetadata;

/// Everything read from one file's tags in a single pass.
#[derive(Debug, Clone, Default)]
pub struct TagReadout {
    pub metadata: TrackMetadata,
    pub embedded_art: Option<Vec<u8>>,
}

fn first_non_empty_value<F>(primary_tag: Option<&Tag>, tags: &[Tag], mut extractor: F) -> Option<String>
where
    F: FnMut(&Tag) -> Option<String>,
{
    primary_tag
        .into_iter()
        .chain(tags.iter())
        .filter_map(|tag| extractor(tag))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn derive_year_from_date(date: &str) -> Option<String> {
    let year: String = date.chars().take(4).collect();
    (year.chars().count() == 4 && year.chars().all(|c| c.is_ascii_digit())).then_some(year)
}

fn first_picture(primary_tag: Option<&Tag>, tags: &[Tag]) -> Option<Vec<u8>> {
    primary_tag
        .into_iter()
        .chain(tags.iter())
        .find_map(|tag| tag.pictures().first().map(|picture| picture.data().to_vec()))
}

/// Reads tag values and the first embedded picture.
///
/// Only `title`, `artist` and `album` are typed; the remaining values are
/// stored as extra fields under stable keys.
pub fn read_track_tags(path: &Path) -> Result<TagReadout, String> {
    let tagged_file = read_from_path(path).map_err(|err| err.to_string())?;
    let primary_tag = tagged_file.primary_tag();
    let tags = tagged_file.tags();

    let mut metadata = TrackMetadata {
        title: first_non_empty_value(primary_tag, tags, |tag| {
            tag.title().map(|value| value.into_owned())
        }),
        artist: first_non_empty_value(primary_tag, tags, |tag| {
            tag.artist().map(|value| value.into_owned())
        }),
        album: first_non_empty_value(primary_tag, tags, |tag| {
            tag.album().map(|value| value.into_owned())
        }),
        ..TrackMetadata::default()
    };

    let album_artist = first_non_empty_value(primary_tag, tags, |tag| {
        tag.get_string(&ItemKey::AlbumArtist).map(str::to_string)
    });
    let genre = first_non_empty_value(primary_tag, tags, |tag| {
        tag.genre().map(|value| value.into_owned())
    });
    let date = first_non_empty_value(primary_tag, tags, |tag| {
        tag.get_string(&ItemKey::RecordingDate)
            .or_else(|| tag.get_string(&ItemKey::OriginalReleaseDate))
            .map(str::to_string)
    });
    let year = first_non_empty_value(primary_tag, tags, |tag| {
        tag.get_string(&ItemKey::Year).map(str::to_string)
    })
    .or_else(|| date.as_deref().and_then(derive_year_from_date));
    let track_number = first_non_empty_value(primary_tag, tags, |tag| {
        tag.track().map(|value| value.to_string())
    });

    for (key, value) in [
        ("album_artist", album_artist),
        ("genre", genre),
        ("date", date),
        ("year", year),
        ("track_number", track_number),
    ] {
        if let Some(value) = value {
            metadata.extra.insert(key.to_string(), value.into());
        }
    }

    let duration_ms = tagged_file.properties().duration().as_millis() as u64;
    if duration_ms > 0 {
        metadata.extra.insert("duration_ms".to_string(), duration_ms.into());
    }

    Ok(TagReadout {
        metadata,
        embedded_art: first_picture(primary_tag, tags),
    })
}
