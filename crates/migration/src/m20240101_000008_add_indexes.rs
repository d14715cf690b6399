use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// `(index name, table, column)` for every foreign-key column.
const FK_INDEXES: [(&str, Tbl, Col); 6] = [
    ("idx_cities_state", Tbl::Cities, Col::StateId),
    ("idx_places_city", Tbl::Places, Col::CityId),
    ("idx_places_user", Tbl::Places, Col::UserId),
    ("idx_reviews_place", Tbl::Reviews, Col::PlaceId),
    ("idx_reviews_user", Tbl::Reviews, Col::UserId),
    ("idx_place_amenity_amenity", Tbl::PlaceAmenity, Col::AmenityId),
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (name, table, col) in FK_INDEXES {
            manager
                .create_index(
                    Index::create()
                        .name(name)
                        .table(table)
                        .col(col)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (name, table, _) in FK_INDEXES {
            manager
                .drop_index(Index::drop().name(name).table(table).to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(DeriveIden, Clone, Copy)]
enum Tbl {
    Cities,
    Places,
    Reviews,
    PlaceAmenity,
}

#[derive(DeriveIden, Clone, Copy)]
enum Col {
    StateId,
    CityId,
    UserId,
    PlaceId,
    AmenityId,
}
