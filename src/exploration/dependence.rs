use crate::program::{Instruction, LockOp, MemoryOp};

/// Static dependence of two instructions: their relative order may affect
/// the observed result.
///
/// Two instructions are dependent iff they belong to the same thread, or
/// they touch the same object and at least one writes it or at least one
/// acquires it. A happens-before relation built on this predicate does not
/// totally order all accesses to an object, because loads commute.
pub fn dependent(a: &Instruction, b: &Instruction) -> bool {
    same_thread(a, b) || (a.operand() == b.operand() && (one_write(a, b) || one_lock(a, b)))
}

/// Whether two instructions can simultaneously be the next step of their
/// threads.
///
/// An acquire and a release of the same lock are never co-enabled; every
/// other cross-thread pair is assumed co-enabled. Assuming co-enabledness
/// is always safe for partial-order reduction, it just weakens the
/// reduction.
pub fn coenabled(a: &Instruction, b: &Instruction) -> bool {
    !(same_thread(a, b) || lock_unlock_same_object(a, b))
}

fn same_thread(a: &Instruction, b: &Instruction) -> bool {
    a.tid() == b.tid()
}

fn is_memory_modification(instruction: &Instruction) -> bool {
    matches!(
        instruction,
        Instruction::Memory { op: MemoryOp::Store | MemoryOp::ReadModifyWrite, .. }
    )
}

fn is_lock_acquire(instruction: &Instruction) -> bool {
    matches!(instruction, Instruction::Lock { op: LockOp::Lock | LockOp::Trylock, .. })
}

fn one_write(a: &Instruction, b: &Instruction) -> bool {
    is_memory_modification(a) || is_memory_modification(b)
}

fn one_lock(a: &Instruction, b: &Instruction) -> bool {
    is_lock_acquire(a) || is_lock_acquire(b)
}

fn lock_unlock_same_object(a: &Instruction, b: &Instruction) -> bool {
    let lock_unlock = |x: &Instruction, y: &Instruction| {
        matches!(x, Instruction::Lock { op: LockOp::Lock, .. })
            && matches!(y, Instruction::Lock { op: LockOp::Unlock, .. })
    };
    a.operand() == b.operand() && (lock_unlock(a, b) || lock_unlock(b, a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{Object, Tid};

    fn load(tid: Tid, obj: u64) -> Instruction {
        Instruction::Memory { tid, op: MemoryOp::Load, operand: Object(obj) }
    }

    fn store(tid: Tid, obj: u64) -> Instruction {
        Instruction::Memory { tid, op: MemoryOp::Store, operand: Object(obj) }
    }

    fn lock_op(tid: Tid, op: LockOp, obj: u64) -> Instruction {
        Instruction::Lock { tid, op, operand: Object(obj) }
    }

    #[test]
    fn loads_of_the_same_object_commute() {
        assert!(!dependent(&load(0, 1), &load(1, 1)));
    }

    #[test]
    fn a_write_makes_accesses_dependent() {
        assert!(dependent(&store(0, 1), &load(1, 1)));
        assert!(dependent(&load(0, 1), &store(1, 1)));
        assert!(dependent(&store(0, 1), &store(1, 1)));
    }

    #[test]
    fn disjoint_objects_are_independent() {
        assert!(!dependent(&store(0, 1), &store(1, 2)));
    }

    #[test]
    fn same_thread_is_always_dependent() {
        assert!(dependent(&load(0, 1), &load(0, 2)));
    }

    #[test]
    fn lock_acquisitions_are_dependent() {
        assert!(dependent(&lock_op(0, LockOp::Lock, 3), &lock_op(1, LockOp::Lock, 3)));
        assert!(dependent(&lock_op(0, LockOp::Trylock, 3), &lock_op(1, LockOp::Unlock, 3)));
        assert!(!dependent(&lock_op(0, LockOp::Unlock, 3), &lock_op(1, LockOp::Unlock, 3)));
    }

    #[test]
    fn dependent_and_coenabled_are_symmetric() {
        let instructions = [
            load(0, 1),
            store(1, 1),
            store(1, 2),
            lock_op(0, LockOp::Lock, 3),
            lock_op(2, LockOp::Unlock, 3),
            lock_op(1, LockOp::Trylock, 3),
        ];
        for a in &instructions {
            for b in &instructions {
                assert_eq!(dependent(a, b), dependent(b, a));
                assert_eq!(coenabled(a, b), coenabled(b, a));
            }
        }
    }

    #[test]
    fn lock_and_unlock_of_the_same_object_are_not_coenabled() {
        assert!(!coenabled(&lock_op(0, LockOp::Lock, 3), &lock_op(1, LockOp::Unlock, 3)));
        assert!(coenabled(&lock_op(0, LockOp::Lock, 3), &lock_op(1, LockOp::Unlock, 4)));
        assert!(coenabled(&lock_op(0, LockOp::Trylock, 3), &lock_op(1, LockOp::Unlock, 3)));
        assert!(coenabled(&store(0, 1), &store(1, 1)));
    }
}
