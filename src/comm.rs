//! Communication fabrics
//!
//! [`LocalUniverse`] runs every worker as a thread of the current process and
//! is what the tests use. With the `mpi` feature the [`Communicator`] trait is
//! also implemented for MPI communicators.
//!
//! [`Communicator`]: crate::traits::Communicator

mod local;
#[cfg(feature = "mpi")]
mod mpi_comm;

pub use local::{LocalCommunicator, LocalUniverse};

/// Exclusive prefix sums of `counts`, i.e. where each contribution starts
pub fn displacements(counts: &[usize]) -> Vec<usize> {
    counts
        .iter()
        .scan(0, |acc, &x| {
            let tmp = *acc;
            *acc += x;
            Some(tmp)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::displacements;

    #[test]
    fn test_displacements() {
        assert_eq!(displacements(&[3, 0, 2, 5]), vec![0, 3, 3, 5]);
        assert!(displacements(&[]).is_empty());
    }
}
