use std::collections::HashSet;

use bson::{doc, oid::ObjectId, Document};
use mongodb::{options::IndexOptions, Database, IndexModel};
use serde::{Deserialize, Serialize};

use crate::{error::Error, mongo_ext::Collection};

#[derive(Serialize, Deserialize)]
pub struct MigrateModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub version: i64,
}

#[derive(Clone)]
pub struct MigrationCollection(pub Collection<MigrateModel>);

impl std::ops::Deref for MigrationCollection {
    type Target = Collection<MigrateModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl MigrationCollection {
    pub async fn applied_versions(&self) -> Result<HashSet<i64>, Error> {
        Ok(self
            .find_all(None, None)
            .await?
            .into_iter()
            .map(|it| it.version)
            .collect())
    }

    pub async fn insert_version(&self, version: i64) -> Result<(), Error> {
        self.insert_one(
            MigrateModel {
                id: ObjectId::new(),
                version,
            },
            None,
        )
        .await
        .map(|_| ())
        .map_err(Into::into)
    }
}

fn index(keys: Document, unique: bool) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(unique).build())
        .build()
}

async fn v1_migrate(db: &Database) -> Result<(), Error> {
    db.collection::<Document>("migrations")
        .create_index(index(doc! { "version": 1 }, true), None)
        .await?;

    let users = db.collection::<Document>("users");
    users
        .create_index(index(doc! { "email": 1 }, true), None)
        .await?;
    users
        .create_index(index(doc! { "role": 1 }, false), None)
        .await?;

    db.collection::<Document>("appointments")
        .create_index(index(doc! { "created_at": -1 }, false), None)
        .await?;

    db.collection::<Document>("messages")
        .create_index(index(doc! { "created_at": -1 }, false), None)
        .await?;

    Ok(())
}

/// Applies every migration not yet recorded in `migrations`. Index creation is
/// idempotent, so a run interrupted before its version is recorded is safe to
/// repeat.
pub async fn run_migration(db: &Database) -> Result<(), Error> {
    let migrations = MigrationCollection(Collection::from(db.collection("migrations")));
    let applied = migrations.applied_versions().await?;

    macro_rules! migrate {
        ($version:expr, $fun:ident) => {
            if !applied.contains(&$version) {
                tracing::debug!("running migration version {}", $version);
                $fun(db).await?;
                migrations.insert_version($version).await?;
            }
        };
    }

    migrate!(1, v1_migrate);

    Ok(())
}
