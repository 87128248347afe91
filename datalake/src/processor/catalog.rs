use common::Result;
use datafusion::prelude::*;

/// Dimension tables derived from the song catalog.
pub struct CatalogTables {
    pub songs: DataFrame,
    pub artists: DataFrame,
}

pub struct CatalogTransformer;

impl CatalogTransformer {
    pub fn new() -> Self {
        Self
    }

    pub fn derive_tables(&self, raw: DataFrame) -> Result<CatalogTables> {
        Ok(CatalogTables {
            songs: self.songs(raw.clone())?,
            artists: self.artists(raw)?,
        })
    }

    // A missing year becomes 0 so every song lands in a partition
    fn songs(&self, raw: DataFrame) -> Result<DataFrame> {
        let year = when(col("year").is_null(), lit(0i64))
            .otherwise(col("year"))?
            .alias("year");

        let songs = raw
            .select(vec![
                col("song_id"),
                col("title"),
                col("artist_id"),
                year,
                col("duration"),
            ])?
            .distinct()?;
        Ok(songs)
    }

    fn artists(&self, raw: DataFrame) -> Result<DataFrame> {
        let artists = raw
            .select(vec![
                col("artist_id"),
                col("artist_name").alias("name"),
                col("artist_location").alias("location"),
                col("artist_latitude").alias("latitude"),
                col("artist_longitude").alias("longitude"),
            ])?
            .distinct()?;
        Ok(artists)
    }
}

impl Default for CatalogTransformer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::test_util::{df_from_json, ints, session, strings};
    use crate::schema::{RawSchema, get_raw_schema};

    const SONG_A: &str = r#"{"num_songs": 1, "artist_id": "ARD7TVE1187B99BFB1", "artist_latitude": null, "artist_longitude": null, "artist_location": "California - LA", "artist_name": "Casual", "song_id": "SOMZWCG12A8C13C480", "title": "I Didn't Mean To", "duration": 218.93179, "year": 0}"#;
    const SONG_B: &str = r#"{"num_songs": 1, "artist_id": "ARMJAGH1187FB546F3", "artist_latitude": 35.14968, "artist_longitude": -90.04892, "artist_location": "Memphis, TN", "artist_name": "The Box Tops", "song_id": "SOCIWDW12A8C13D406", "title": "Soul Deep", "duration": 148.03546, "year": 1969}"#;
    const SONG_NO_YEAR: &str = r#"{"num_songs": 1, "artist_id": "ARMJAGH1187FB546F3", "artist_latitude": 35.14968, "artist_longitude": -90.04892, "artist_location": "Memphis, TN", "artist_name": "The Box Tops", "song_id": "SOGXHEG12AB018653E", "title": "It Makes No Difference Now", "duration": 133.32853}"#;

    #[tokio::test]
    async fn test_songs_are_distinct() {
        let ctx = session();
        let raw = df_from_json(&ctx, &[SONG_A, SONG_B, SONG_A], get_raw_schema(RawSchema::Song));

        let tables = CatalogTransformer::new().derive_tables(raw).unwrap();

        assert_eq!(tables.songs.clone().count().await.unwrap(), 2);
        assert_eq!(
            strings(&tables.songs, "song_id").await,
            vec![
                Some("SOCIWDW12A8C13D406".to_string()),
                Some("SOMZWCG12A8C13C480".to_string())
            ]
        );
        let columns: Vec<_> = tables
            .songs
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(columns, vec!["song_id", "title", "artist_id", "year", "duration"]);
    }

    #[tokio::test]
    async fn test_missing_year_becomes_zero() {
        let ctx = session();
        let raw = df_from_json(&ctx, &[SONG_B, SONG_NO_YEAR], get_raw_schema(RawSchema::Song));

        let tables = CatalogTransformer::new().derive_tables(raw).unwrap();

        assert_eq!(ints(&tables.songs, "year").await, vec![Some(0), Some(1969)]);
    }

    #[tokio::test]
    async fn test_artists_renamed_and_distinct() {
        let ctx = session();
        let raw = df_from_json(
            &ctx,
            &[SONG_A, SONG_B, SONG_NO_YEAR],
            get_raw_schema(RawSchema::Song),
        );

        let tables = CatalogTransformer::new().derive_tables(raw).unwrap();

        assert_eq!(tables.artists.clone().count().await.unwrap(), 2);
        assert_eq!(
            strings(&tables.artists, "name").await,
            vec![Some("Casual".to_string()), Some("The Box Tops".to_string())]
        );
        assert!(tables.artists.schema().field_with_unqualified_name("latitude").is_ok());
        assert!(tables.artists.schema().field_with_unqualified_name("artist_name").is_err());
    }
}
