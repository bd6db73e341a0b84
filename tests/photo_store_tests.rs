use recipe_assist::storage::photos::{PHOTOS_KEY, USER_PHOTOS_BUCKET};
use recipe_assist::storage::{
    FavoriteItem, FavoriteKind, FavoritesStore, JsonFileStore, KeyValueStore, LocalFirstStore,
    MemoryRemote, PhotoFile, StoreError,
};
use std::sync::Arc;
use tempfile::tempdir;

fn jpeg(name: &str) -> PhotoFile {
    PhotoFile::new(name, "image/jpeg", vec![0xD8; 32])
}

#[tokio::test]
async fn test_upload_then_list_shows_newest_first() -> Result<(), StoreError> {
    let dir = tempdir()?;
    let store = LocalFirstStore::new(Arc::new(JsonFileStore::open(dir.path().join("kv.json"))?));

    let first = store.upload(&jpeg("a.jpg"), "u-1").await?;
    let second = store.upload(&jpeg("b.jpg"), "u-1").await?;
    store.upload(&jpeg("c.jpg"), "u-2").await?;

    let listed = store.list("u-1").await;
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second.id);
    assert_eq!(listed[1].id, first.id);
    Ok(())
}

#[tokio::test]
async fn test_photos_survive_reopening_the_store() -> Result<(), StoreError> {
    let dir = tempdir()?;
    let path = dir.path().join("kv.json");
    let uploaded = {
        let store = LocalFirstStore::new(Arc::new(JsonFileStore::open(&path)?));
        store.upload(&jpeg("dish.jpg"), "u-1").await?
    };

    let reopened = LocalFirstStore::new(Arc::new(JsonFileStore::open(&path)?));
    let listed = reopened.list("u-1").await;
    assert_eq!(listed, vec![uploaded]);
    Ok(())
}

#[tokio::test]
async fn test_set_avatar_leaves_exactly_one_avatar() -> Result<(), StoreError> {
    let dir = tempdir()?;
    let kv = Arc::new(JsonFileStore::open(dir.path().join("kv.json"))?);
    let store = LocalFirstStore::new(kv.clone()).with_remote(Arc::new(MemoryRemote::new()));

    let mut ids = Vec::new();
    for name in ["a.jpg", "b.jpg", "c.jpg"] {
        ids.push(store.upload(&jpeg(name), "u-1").await?.id);
    }

    for target in [&ids[0], &ids[2], &ids[1], &ids[1]] {
        store.set_avatar(target, "u-1").await?;
        let avatars: Vec<_> = store
            .list("u-1")
            .await
            .into_iter()
            .filter(|p| p.is_avatar)
            .collect();
        assert_eq!(avatars.len(), 1);
        assert_eq!(&avatars[0].id, target);
    }
    assert_eq!(store.avatar("u-1").await.map(|p| p.id).as_ref(), Some(&ids[1]));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_avatar_updates_keep_one_avatar() -> Result<(), StoreError> {
    let dir = tempdir()?;
    let store = Arc::new(LocalFirstStore::new(Arc::new(JsonFileStore::open(
        dir.path().join("kv.json"),
    )?)));
    let a = store.upload(&jpeg("a.jpg"), "u-1").await?.id;
    let b = store.upload(&jpeg("b.jpg"), "u-1").await?.id;

    let (left, right) = tokio::join!(store.set_avatar(&a, "u-1"), store.set_avatar(&b, "u-1"));
    left?;
    right?;

    let avatars = store
        .list("u-1")
        .await
        .into_iter()
        .filter(|p| p.is_avatar)
        .count();
    assert_eq!(avatars, 1);
    Ok(())
}

#[tokio::test]
async fn test_remove_deletes_only_the_target() -> Result<(), StoreError> {
    let dir = tempdir()?;
    let store = LocalFirstStore::new(Arc::new(JsonFileStore::open(dir.path().join("kv.json"))?));
    let keep = store.upload(&jpeg("keep.jpg"), "u-1").await?;
    let gone = store.upload(&jpeg("gone.jpg"), "u-1").await?;

    store.remove(&gone.id, USER_PHOTOS_BUCKET, &gone.file_name).await?;
    let listed = store.list("u-1").await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, keep.id);
    Ok(())
}

#[tokio::test]
async fn test_photo_from_path_reads_bytes_and_type() -> Result<(), StoreError> {
    let dir = tempdir()?;
    let path = dir.path().join("plate.PNG");
    std::fs::write(&path, b"\x89PNG")?;

    let file = PhotoFile::from_path(&path).await?;
    assert_eq!(file.name, "plate.PNG");
    assert_eq!(file.content_type, "image/png");
    assert_eq!(file.size(), 4);
    Ok(())
}

#[test]
fn test_photos_and_favorites_share_one_store() -> Result<(), StoreError> {
    let dir = tempdir()?;
    let kv = Arc::new(JsonFileStore::open(dir.path().join("kv.json"))?);
    let favorites = FavoritesStore::new(kv.clone());
    favorites.add(FavoriteItem::new("12", FavoriteKind::Dish, "红烧肉", ""))?;

    assert!(kv.get("food-favorites")?.is_some());
    assert!(kv.get(PHOTOS_KEY)?.is_none());
    Ok(())
}
