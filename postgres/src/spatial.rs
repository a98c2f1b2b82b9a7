//! PostGIS-backed spatial lookup.

use nearcast_core::environment::{NearbyShop, SpatialIndex};
use nearcast_core::error::SpatialError;
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;

/// Hard cap on results per lookup, regardless of how dense the area is.
pub const MAX_RESULTS: i64 = 10;

/// Spatial index backed by a PostGIS `shops` table.
///
/// The `shops` table carries a `geom` geometry column in SRID 4326; distance
/// is computed on the geography cast so results are in meters. Rows come
/// back ordered by ascending distance, capped at [`MAX_RESULTS`].
pub struct PostgisSpatialIndex {
    pool: PgPool,
}

impl PostgisSpatialIndex {
    /// Create a spatial index over the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl SpatialIndex for PostgisSpatialIndex {
    fn find_nearby(
        &self,
        latitude: f64,
        longitude: f64,
        radius_m: f64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<NearbyShop>, SpatialError>> + Send + '_>> {
        Box::pin(async move {
            // ST_MakePoint takes (lon, lat).
            let rows = sqlx::query(
                r"
                SELECT
                    shop_id,
                    shop_name,
                    category,
                    ST_Distance(
                        geom::geography,
                        ST_SetSRID(ST_MakePoint($1, $2), 4326)::geography
                    ) AS distance
                FROM shops
                WHERE ST_Distance(
                    geom::geography,
                    ST_SetSRID(ST_MakePoint($1, $2), 4326)::geography
                ) <= $3
                ORDER BY distance
                LIMIT $4
                ",
            )
            .bind(longitude)
            .bind(latitude)
            .bind(radius_m)
            .bind(MAX_RESULTS)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SpatialError::Lookup(e.to_string()))?;

            let shops = rows
                .iter()
                .map(|row| NearbyShop {
                    shop_id: row.get("shop_id"),
                    shop_name: row.get("shop_name"),
                    category: row.get("category"),
                    distance: row.get("distance"),
                })
                .collect::<Vec<_>>();

            #[allow(clippy::cast_precision_loss)] // At most MAX_RESULTS rows
            metrics::histogram!("spatial.results_per_lookup").record(shops.len() as f64);

            Ok(shops)
        })
    }
}
