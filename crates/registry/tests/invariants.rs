//! Property tests for registry invariants: uniqueness, existence
//! consistency, order preservation and owner isolation.

use filechain_registry::{FileRegistry, RegistryError};
use filechain_types::{ContentId, ManualTimeSource, OwnerId};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Add { owner: u8, cid: u8 },
    Delete { owner: u8, cid: u8 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..3, 0u8..6).prop_map(|(owner, cid)| Op::Add { owner, cid }),
        (0u8..3, 0u8..6).prop_map(|(owner, cid)| Op::Delete { owner, cid }),
    ]
}

fn owner(n: u8) -> OwnerId {
    OwnerId::new([n + 1; 32])
}

fn cid(n: u8) -> ContentId {
    ContentId::parse(format!("QmProp{n}")).unwrap()
}

fn registry() -> FileRegistry {
    FileRegistry::with_clock(Arc::new(ManualTimeSource::new(1_000)))
}

proptest! {
    /// Replays random add/delete sequences against a Vec model per owner.
    #[test]
    fn registry_matches_ordered_model(ops in prop::collection::vec(op(), 1..64)) {
        let registry = registry();
        let mut model: Vec<Vec<u8>> = vec![Vec::new(); 3];

        for op in ops {
            match op {
                Op::Add { owner: o, cid: c } => {
                    let result = registry.add(&owner(o), &owner(o), cid(c), format!("file-{c}"));
                    if model[o as usize].contains(&c) {
                        prop_assert!(
                            matches!(result, Err(RegistryError::DuplicateCid { .. })),
                            "duplicate add must fail"
                        );
                    } else {
                        prop_assert!(result.is_ok());
                        model[o as usize].push(c);
                        prop_assert!(registry.exists(&owner(o), &cid(c)));
                    }
                }
                Op::Delete { owner: o, cid: c } => {
                    let result = registry.delete(&owner(o), &owner(o), &cid(c));
                    match model[o as usize].iter().position(|x| *x == c) {
                        Some(idx) => {
                            prop_assert!(result.is_ok());
                            model[o as usize].remove(idx);
                            prop_assert!(!registry.exists(&owner(o), &cid(c)));
                        }
                        None => prop_assert!(
                            matches!(result, Err(RegistryError::NotFound { .. })),
                            "deleting absent cid must be NotFound"
                        ),
                    }
                }
            }
        }

        for o in 0..3u8 {
            let listed: Vec<ContentId> =
                registry.list(&owner(o)).into_iter().map(|r| r.cid).collect();
            let expected: Vec<ContentId> = model[o as usize].iter().map(|c| cid(*c)).collect();
            prop_assert_eq!(listed, expected);
        }
    }

    /// Mutations by one owner never change another owner's listing.
    #[test]
    fn owners_never_observe_each_other(cids in prop::collection::vec(0u8..6, 1..20)) {
        let registry = registry();
        let bystander = owner(2);
        registry.add(&bystander, &bystander, cid(0), "keep").unwrap();
        let before = registry.list(&bystander);

        for c in cids {
            let _ = registry.add(&owner(0), &owner(0), cid(c), "x");
            let _ = registry.delete(&owner(0), &owner(0), &cid(c));
            let _ = registry.add(&owner(0), &bystander, cid(c), "cross");
            let _ = registry.delete(&owner(0), &bystander, &cid(0));
        }

        prop_assert_eq!(registry.list(&bystander), before);
    }
}

#[test]
fn end_to_end_registry_scenario() {
    let registry = registry();
    let w = owner(0);
    let qm = ContentId::parse("Qm123").unwrap();

    registry.add(&w, &w, qm.clone(), "report.pdf").unwrap();
    let files = registry.list(&w);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].cid, qm);
    assert_eq!(files[0].name, "report.pdf");

    registry.delete(&w, &w, &qm).unwrap();
    assert!(registry.list(&w).is_empty());
    assert!(matches!(
        registry.delete(&w, &w, &qm),
        Err(RegistryError::NotFound { .. })
    ));
}
