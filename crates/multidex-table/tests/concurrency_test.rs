//! Reader/writer tests for tables using the internal lock policy.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use multidex_table::{
    External, Internal, LockMode, MultiIndexTable, Ordered, OrderedPredicate, TableConfig,
    Unordered, UnorderedPredicate,
};

#[derive(Debug, Clone, PartialEq)]
struct Account {
    id: u64,
    owner: u64,
    balance: i64,
}

struct ById;

impl UnorderedPredicate<Account> for ById {
    fn hash(&self, record: &Account) -> usize {
        record.id as usize
    }

    fn equal(&self, a: &Account, b: &Account) -> bool {
        a.id == b.id
    }
}

struct ByOwner;

impl OrderedPredicate<Account> for ByOwner {
    fn less(&self, a: &Account, b: &Account) -> bool {
        a.owner < b.owner
    }
}

type Accounts = MultiIndexTable<Account, (Unordered<ById>, Ordered<ByOwner>), Internal, 8>;

fn accounts() -> Arc<Accounts> {
    Arc::new(
        MultiIndexTable::new(TableConfig::new(4, 1.0), (Unordered(ById), Ordered(ByOwner)))
            .unwrap(),
    )
}

fn account(id: u64, owner: u64) -> Account {
    Account {
        id,
        owner,
        balance: 0,
    }
}

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn test_internal_table_is_send_and_sync() {
    assert_send_sync::<Accounts>();
    let table = accounts();
    assert_eq!(table.lock_mode(), LockMode::Internal);
}

#[test]
fn test_parallel_writers() {
    const WRITERS: u64 = 4;
    const PER_WRITER: u64 = 2000;

    let table = accounts();
    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for n in 0..PER_WRITER {
                    let id = w * PER_WRITER + n;
                    table.insert(account(id, id % 17)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(table.len(), (WRITERS * PER_WRITER) as usize);
    for id in [0, PER_WRITER, WRITERS * PER_WRITER - 1] {
        assert_eq!(table.find_first::<0>(&account(id, 0)).map(|a| a.id), Some(id));
    }
    table.verify().unwrap();
}

#[test]
fn test_readers_never_see_partial_mutation() {
    let table = accounts();
    for id in 0..64 {
        table.insert(account(id, id % 4)).unwrap();
    }

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let table = Arc::clone(&table);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    for owner in 0..4 {
                        for found in table.find_all::<1>(&account(0, owner)) {
                            assert_eq!(found.owner, owner);
                            let by_id = table.find_all::<0>(&found);
                            assert!(by_id.len() <= 1);
                        }
                    }
                    table.verify().unwrap();
                }
            })
        })
        .collect();

    for round in 0..500u64 {
        let id = round % 64;
        let mut moved = account(id, (round + 1) % 4);
        moved.balance = round as i64;
        table.update::<0>(&account(id, 0), moved).unwrap();
        if round % 10 == 0 {
            table.delete::<0>(&account(id, 0));
            table.insert(account(id, id % 4)).unwrap();
        }
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(table.len(), 64);
    let last = table.find_first::<0>(&account(499 % 64, 0)).unwrap();
    assert_eq!((last.owner, last.balance), (0, 499));
    table.verify().unwrap();
}

#[test]
fn test_external_table_single_thread() {
    let table: MultiIndexTable<Account, (Unordered<ById>,), External> =
        MultiIndexTable::with_predicates((Unordered(ById),)).unwrap();
    assert_eq!(table.lock_mode(), LockMode::External);
    table.insert(account(1, 1)).unwrap();
    assert_eq!(table.delete::<0>(&account(1, 0)), 1);
    assert!(table.is_empty());
}
