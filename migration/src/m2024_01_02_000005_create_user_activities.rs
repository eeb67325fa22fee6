//! Migration to create the user_activities table (tenant-scoped audit log).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserActivities::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserActivities::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UserActivities::SchemaName)
                            .string_len(63)
                            .not_null(),
                    )
                    .col(ColumnDef::new(UserActivities::UserId).uuid().null())
                    .col(
                        ColumnDef::new(UserActivities::ActivityType)
                            .string_len(50)
                            .not_null(),
                    )
                    .col(ColumnDef::new(UserActivities::Details).text().not_null())
                    .col(
                        ColumnDef::new(UserActivities::Status)
                            .string_len(20)
                            .not_null()
                            .default("success"),
                    )
                    .col(ColumnDef::new(UserActivities::IpAddress).text().null())
                    .col(
                        ColumnDef::new(UserActivities::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_activities_schema_user_type")
                    .table(UserActivities::Table)
                    .col(UserActivities::SchemaName)
                    .col(UserActivities::UserId)
                    .col(UserActivities::ActivityType)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_user_activities_schema_user_type")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(UserActivities::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UserActivities {
    Table,
    Id,
    SchemaName,
    UserId,
    ActivityType,
    Details,
    Status,
    IpAddress,
    CreatedAt,
}
