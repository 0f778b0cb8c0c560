//! The safety classifier.
//!
//! Pure and deterministic: classification depends only on the shape of the
//! change, never on database state. The level/breaking/data-loss matrix is
//! part of the engine's contract and is exercised verbatim by the tests.

use crate::plan::{Safety, SafetyLevel};
use schema_model::{LogicalType, TypeMetadata};

fn safety(
    level: SafetyLevel,
    breaking_change: bool,
    data_loss: bool,
    rollback_description: &str,
    rollback_data_loss: bool,
) -> Safety {
    Safety {
        level,
        breaking_change,
        data_loss,
        rollback_description: rollback_description.to_string(),
        rollback_data_loss,
        safer_alternatives: Vec::new(),
    }
}

pub(crate) fn create_table() -> Safety {
    safety(SafetyLevel::Safe, false, false, "drop the table", false)
}

pub(crate) fn drop_table() -> Safety {
    let mut s = safety(
        SafetyLevel::Dangerous,
        true,
        true,
        "recreate the table structure; row data is not restored",
        true,
    );
    s.safer_alternatives
        .push("rename table and drop after grace period".into());
    s
}

pub(crate) fn add_column(nullable: bool, has_default: bool) -> Safety {
    match (nullable, has_default) {
        (true, _) => safety(SafetyLevel::Safe, false, false, "drop the column", false),
        (false, true) => {
            let mut s = safety(
                SafetyLevel::Review,
                false,
                false,
                "drop the column",
                false,
            );
            s.safer_alternatives
                .push("on large tables, adding NOT NULL with a default can take a long lock".into());
            s
        }
        (false, false) => {
            let mut s = safety(
                SafetyLevel::Dangerous,
                true,
                false,
                "drop the column",
                false,
            );
            s.safer_alternatives
                .push("add the column nullable, backfill, then set NOT NULL (multi-phase)".into());
            s
        }
    }
}

pub(crate) fn drop_column() -> Safety {
    let mut s = safety(
        SafetyLevel::Lossy,
        true,
        true,
        "re-add the column with its original definition; values are not restored",
        true,
    );
    s.safer_alternatives
        .push("rename the column and drop it after a deprecation period".into());
    s
}

pub(crate) fn rename_column(from: &str, to: &str) -> Safety {
    let mut s = safety(
        SafetyLevel::MultiPhase,
        true,
        false,
        "rename back",
        false,
    );
    s.safer_alternatives.push(format!(
        "expand/contract: add `{to}`, dual-write, backfill, drop `{from}` (multi-phase rename_column pattern)"
    ));
    s
}

/// Whether a type change can lose information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypeChangeKind {
    Widening,
    Narrowing,
}

pub(crate) fn alter_type(kind: TypeChangeKind) -> Safety {
    match kind {
        TypeChangeKind::Widening => safety(
            SafetyLevel::Review,
            false,
            false,
            "narrow the type back; only safe while no wider values were written",
            false,
        ),
        TypeChangeKind::Narrowing => {
            let mut s = safety(
                SafetyLevel::Dangerous,
                true,
                true,
                "widen the type back; values truncated by the narrowing are not restored",
                true,
            );
            s.safer_alternatives
                .push("use the multi-phase narrow_type pattern with a shadow column".into());
            s
        }
    }
}

pub(crate) fn set_not_null() -> Safety {
    let mut s = safety(
        SafetyLevel::Review,
        true,
        false,
        "drop the NOT NULL constraint",
        false,
    );
    s.safer_alternatives
        .push("verify no NULLs exist before applying".into());
    s
}

pub(crate) fn drop_not_null() -> Safety {
    safety(
        SafetyLevel::Safe,
        false,
        false,
        "set NOT NULL again (requires no NULLs written meanwhile)",
        false,
    )
}

pub(crate) fn change_default() -> Safety {
    safety(
        SafetyLevel::Safe,
        false,
        false,
        "restore the previous default; existing rows are unaffected either way",
        false,
    )
}

pub(crate) fn add_index(supports_concurrent: bool) -> Safety {
    let mut s = safety(SafetyLevel::Review, false, false, "drop the index", false);
    if supports_concurrent {
        s.safer_alternatives
            .push("create the index CONCURRENTLY to avoid blocking writes".into());
    }
    s
}

pub(crate) fn drop_index() -> Safety {
    safety(
        SafetyLevel::Review,
        false,
        false,
        "recreate the index from its original definition",
        false,
    )
}

pub(crate) fn add_foreign_key() -> Safety {
    let mut s = safety(
        SafetyLevel::Review,
        false,
        false,
        "drop the constraint",
        false,
    );
    s.safer_alternatives
        .push("existing rows are validated; orphaned rows make this fail".into());
    s
}

pub(crate) fn drop_foreign_key() -> Safety {
    safety(
        SafetyLevel::Safe,
        false,
        false,
        "re-add the constraint (existing data must still satisfy it)",
        false,
    )
}

pub(crate) fn add_unique() -> Safety {
    let mut s = safety(
        SafetyLevel::Review,
        true,
        false,
        "drop the unique constraint",
        false,
    );
    s.safer_alternatives
        .push("duplicate values make this fail; deduplicate first".into());
    s
}

pub(crate) fn drop_unique() -> Safety {
    safety(
        SafetyLevel::Safe,
        false,
        false,
        "re-add the unique constraint (requires no duplicates written meanwhile)",
        false,
    )
}

pub(crate) fn set_primary_key() -> Safety {
    safety(
        SafetyLevel::Review,
        false,
        false,
        "drop the primary key constraint",
        false,
    )
}

pub(crate) fn drop_primary_key() -> Safety {
    safety(
        SafetyLevel::Review,
        true,
        false,
        "re-add the primary key on the original columns",
        false,
    )
}

pub(crate) fn enable_rls() -> Safety {
    let mut s = safety(
        SafetyLevel::Review,
        true,
        false,
        "disable row level security",
        false,
    );
    s.safer_alternatives
        .push("policies must be created separately or all access is denied".into());
    s
}

pub(crate) fn disable_rls() -> Safety {
    safety(
        SafetyLevel::Dangerous,
        true,
        false,
        "enable row level security again",
        false,
    )
}

pub(crate) fn rebuild_table() -> Safety {
    let mut s = safety(
        SafetyLevel::Review,
        false,
        false,
        "rebuild the table back to its previous definition",
        false,
    );
    s.safer_alternatives
        .push("the table is copied row by row; expect a write lock for the duration".into());
    s
}

pub(crate) fn change_comment() -> Safety {
    safety(SafetyLevel::Safe, false, false, "restore the previous comment", false)
}

/// Classify a type change as widening or narrowing.
///
/// Widening: a larger type in the same family, or a move to an unbounded
/// text type. Everything else, including cross-family moves, counts as
/// narrowing.
pub(crate) fn type_change_kind(before: &TypeMetadata, after: &TypeMetadata) -> TypeChangeKind {
    use LogicalType::*;

    if before.is_array != after.is_array {
        return TypeChangeKind::Narrowing;
    }

    fn int_rank(t: &LogicalType) -> Option<u8> {
        match t {
            SmallInt | SmallSerial => Some(0),
            Integer | Serial => Some(1),
            BigInt | BigSerial => Some(2),
            _ => None,
        }
    }

    fn float_rank(t: &LogicalType) -> Option<u8> {
        match t {
            Real => Some(0),
            Double => Some(1),
            _ => None,
        }
    }

    if let (Some(a), Some(b)) = (int_rank(&before.logical), int_rank(&after.logical)) {
        return if b >= a {
            TypeChangeKind::Widening
        } else {
            TypeChangeKind::Narrowing
        };
    }
    if let (Some(a), Some(b)) = (float_rank(&before.logical), float_rank(&after.logical)) {
        return if b >= a {
            TypeChangeKind::Widening
        } else {
            TypeChangeKind::Narrowing
        };
    }

    match (&before.logical, &after.logical) {
        // Any bounded text into unbounded text.
        (Char | Varchar, Text) => TypeChangeKind::Widening,
        (Char, Varchar) | (Varchar, Varchar) | (Char, Char) => {
            match (before.length, after.length) {
                (_, None) => TypeChangeKind::Widening,
                (Some(a), Some(b)) if b >= a => TypeChangeKind::Widening,
                _ => TypeChangeKind::Narrowing,
            }
        }
        (Numeric, Numeric) => match (before.precision, after.precision) {
            (_, None) => TypeChangeKind::Widening,
            (Some(a), Some(b)) if b >= a && after.scale >= before.scale => {
                TypeChangeKind::Widening
            }
            (None, Some(_)) => TypeChangeKind::Narrowing,
            _ => TypeChangeKind::Narrowing,
        },
        (Integer | SmallInt | BigInt, Numeric) => TypeChangeKind::Widening,
        (Timestamp, TimestampTz) => TypeChangeKind::Widening,
        _ => TypeChangeKind::Narrowing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema_model::Dialect;

    fn meta(raw: &str) -> TypeMetadata {
        TypeMetadata::parse(raw, Dialect::Postgres)
    }

    #[test]
    fn the_classification_matrix_holds() {
        // (safety, level, breaking, data loss)
        let cases: Vec<(Safety, SafetyLevel, bool, bool)> = vec![
            (create_table(), SafetyLevel::Safe, false, false),
            (drop_table(), SafetyLevel::Dangerous, true, true),
            (add_column(true, false), SafetyLevel::Safe, false, false),
            (add_column(false, true), SafetyLevel::Review, false, false),
            (add_column(false, false), SafetyLevel::Dangerous, true, false),
            (drop_column(), SafetyLevel::Lossy, true, true),
            (rename_column("a", "b"), SafetyLevel::MultiPhase, true, false),
            (alter_type(TypeChangeKind::Widening), SafetyLevel::Review, false, false),
            (alter_type(TypeChangeKind::Narrowing), SafetyLevel::Dangerous, true, true),
            (set_not_null(), SafetyLevel::Review, true, false),
            (drop_not_null(), SafetyLevel::Safe, false, false),
            (change_default(), SafetyLevel::Safe, false, false),
            (add_index(true), SafetyLevel::Review, false, false),
            (drop_index(), SafetyLevel::Review, false, false),
            (add_foreign_key(), SafetyLevel::Review, false, false),
            (drop_foreign_key(), SafetyLevel::Safe, false, false),
            (add_unique(), SafetyLevel::Review, true, false),
            (enable_rls(), SafetyLevel::Review, true, false),
            (disable_rls(), SafetyLevel::Dangerous, true, false),
        ];
        for (i, (s, level, breaking, data_loss)) in cases.iter().enumerate() {
            assert_eq!(s.level, *level, "case {i}");
            assert_eq!(s.breaking_change, *breaking, "case {i}");
            assert_eq!(s.data_loss, *data_loss, "case {i}");
        }
    }

    #[test]
    fn drop_table_suggests_the_grace_period_alternative() {
        assert_eq!(
            drop_table().safer_alternatives,
            vec!["rename table and drop after grace period".to_string()]
        );
    }

    #[test]
    fn int_widening_and_narrowing() {
        assert_eq!(
            type_change_kind(&meta("integer"), &meta("bigint")),
            TypeChangeKind::Widening
        );
        assert_eq!(
            type_change_kind(&meta("bigint"), &meta("integer")),
            TypeChangeKind::Narrowing
        );
        assert_eq!(
            type_change_kind(&meta("serial"), &meta("bigserial")),
            TypeChangeKind::Widening
        );
    }

    #[test]
    fn varchar_length_changes() {
        assert_eq!(
            type_change_kind(&meta("varchar(10)"), &meta("varchar(20)")),
            TypeChangeKind::Widening
        );
        assert_eq!(
            type_change_kind(&meta("varchar(20)"), &meta("varchar(10)")),
            TypeChangeKind::Narrowing
        );
        assert_eq!(
            type_change_kind(&meta("varchar(20)"), &meta("text")),
            TypeChangeKind::Widening
        );
    }

    #[test]
    fn cross_family_changes_are_narrowing() {
        assert_eq!(
            type_change_kind(&meta("text"), &meta("integer")),
            TypeChangeKind::Narrowing
        );
        assert_eq!(
            type_change_kind(&meta("integer"), &meta("integer[]")),
            TypeChangeKind::Narrowing
        );
    }
}
