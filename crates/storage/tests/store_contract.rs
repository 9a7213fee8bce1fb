use std::sync::Arc;

use shared::domain::{AddressPatch, NewAddress, UserId};
use storage::{open_store, AddressFilter, AddressStore, StoreBackend};

async fn backends() -> Vec<(StoreBackend, Arc<dyn AddressStore>)> {
    let mut stores = Vec::new();
    for backend in [StoreBackend::Memory, StoreBackend::Sqlite] {
        let store = open_store(backend, "sqlite::memory:").await.expect("store");
        stores.push((backend, store));
    }
    stores
}

fn new_address(owner: &str, street: &str) -> NewAddress {
    NewAddress {
        owner_id: UserId::new(owner),
        street: street.to_string(),
        number: "10".into(),
        complement: Some("apt 2".into()),
        neighborhood: "Boa Vista".into(),
        city: "Recife".into(),
        state: "PE".into(),
        zip_code: "50050-000".into(),
        country: Some("BR".into()),
    }
}

#[tokio::test]
async fn create_then_find_returns_same_record() {
    for (backend, store) in backends().await {
        let created = store.create(new_address("u1", "Main")).await.expect("create");
        assert!(!created.is_primary, "{backend}: new records are not primary");

        let found = store
            .find_by_id(created.id)
            .await
            .expect("find")
            .expect("present");
        assert_eq!(found, created, "{backend}");
    }
}

#[tokio::test]
async fn find_all_scopes_by_owner_and_keeps_insertion_order() {
    for (backend, store) in backends().await {
        let first = store.create(new_address("u1", "First")).await.expect("create");
        store.create(new_address("u2", "Other")).await.expect("create");
        let second = store.create(new_address("u1", "Second")).await.expect("create");

        let owned = store
            .find_all(Some(AddressFilter::by_owner(UserId::new("u1"))))
            .await
            .expect("list");
        let ids: Vec<_> = owned.iter().map(|address| address.id).collect();
        assert_eq!(ids, vec![first.id, second.id], "{backend}");

        assert_eq!(store.find_all(None).await.expect("all").len(), 3, "{backend}");
        assert!(store
            .find_all(Some(AddressFilter::by_owner(UserId::new("nobody"))))
            .await
            .expect("empty")
            .is_empty());
    }
}

#[tokio::test]
async fn update_record_merges_only_supplied_fields() {
    for (backend, store) in backends().await {
        let created = store.create(new_address("u1", "Main")).await.expect("create");
        let updated = store
            .update_record(
                created.id,
                AddressPatch {
                    number: Some("99".into()),
                    ..AddressPatch::default()
                },
            )
            .await
            .expect("update")
            .expect("present");

        assert_eq!(updated.number, "99", "{backend}");
        assert_eq!(updated.street, created.street, "{backend}");
        assert_eq!(updated.complement, created.complement, "{backend}");

        let reloaded = store.find_by_id(created.id).await.expect("find").expect("present");
        assert_eq!(reloaded.number, "99", "{backend}");
    }
}

#[tokio::test]
async fn update_record_and_destroy_report_missing_ids() {
    for (backend, store) in backends().await {
        let created = store.create(new_address("u1", "Main")).await.expect("create");

        assert!(store.destroy(created.id).await.expect("destroy"), "{backend}");
        assert!(!store.destroy(created.id).await.expect("destroy again"), "{backend}");
        assert!(store.find_by_id(created.id).await.expect("find").is_none());
        assert!(store
            .update_record(created.id, AddressPatch::default())
            .await
            .expect("update")
            .is_none());
    }
}

#[tokio::test]
async fn set_primary_keeps_a_single_primary_per_owner() {
    for (backend, store) in backends().await {
        let owner = UserId::new("u1");
        let a = store.create(new_address("u1", "A")).await.expect("create");
        let b = store.create(new_address("u1", "B")).await.expect("create");
        let other = store.create(new_address("u2", "C")).await.expect("create");
        assert!(store.set_primary(&other.owner_id, other.id).await.expect("other primary"));

        assert!(store.set_primary(&owner, a.id).await.expect("primary a"));
        let primary = store
            .find_one(AddressFilter::primary_of(owner.clone()))
            .await
            .expect("find")
            .expect("primary");
        assert_eq!(primary.id, a.id, "{backend}");

        assert!(store.set_primary(&owner, b.id).await.expect("primary b"));
        let flags: Vec<_> = store
            .find_all(Some(AddressFilter::by_owner(owner.clone())))
            .await
            .expect("list")
            .into_iter()
            .map(|address| (address.id, address.is_primary))
            .collect();
        assert_eq!(flags, vec![(a.id, false), (b.id, true)], "{backend}");

        let untouched = store.find_by_id(other.id).await.expect("find").expect("present");
        assert!(untouched.is_primary, "{backend}: other owners keep their primary");
    }
}

#[tokio::test]
async fn set_primary_rejects_foreign_address_without_side_effects() {
    for (backend, store) in backends().await {
        let owner = UserId::new("u1");
        let mine = store.create(new_address("u1", "Mine")).await.expect("create");
        let theirs = store.create(new_address("u2", "Theirs")).await.expect("create");
        assert!(store.set_primary(&owner, mine.id).await.expect("primary"));

        let accepted = store.set_primary(&owner, theirs.id).await.expect("set");
        assert!(!accepted, "{backend}");

        let primary = store
            .find_one(AddressFilter::primary_of(owner))
            .await
            .expect("find")
            .expect("still primary");
        assert_eq!(primary.id, mine.id, "{backend}");
    }
}

#[tokio::test]
async fn concurrent_set_primary_on_file_database_all_succeed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("addresses.db").display());
    let store = open_store(StoreBackend::Sqlite, &url).await.expect("store");
    let owner = UserId::new("u1");

    let mut ids = Vec::new();
    for street in ["A", "B", "C", "D", "E"] {
        ids.push(store.create(new_address("u1", street)).await.expect("create").id);
    }

    for _ in 0..10 {
        let handles: Vec<_> = ids
            .iter()
            .map(|&id| {
                let store = Arc::clone(&store);
                let owner = owner.clone();
                tokio::spawn(async move { store.set_primary(&owner, id).await })
            })
            .collect();
        for handle in handles {
            let applied = handle.await.expect("join").expect("set primary");
            assert!(applied);
        }

        let primaries = store
            .find_all(Some(AddressFilter::by_owner(owner.clone())))
            .await
            .expect("list")
            .into_iter()
            .filter(|address| address.is_primary)
            .count();
        assert_eq!(primaries, 1);
    }
}
