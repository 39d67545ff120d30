//! Process context, per spec §6/§9.
//!
//! Spec §9 flags the original's process-wide globals (MPI types, Zoltan
//! init) for replacement: "model as a single Context value that owns the
//! transport and partitioner, created in init and destroyed in finalize;
//! everything else borrows it." `Context` is that value — generic over the
//! transport and partitioner so tests can plug in `ProcessTransport` and
//! `StaticPartitioner` without any conditional compilation.

use fpmas_transport::Transport;

use crate::error::Error;
use crate::partition::Partitioner;

/// Owns one process's transport and partitioner for the lifetime of a run.
/// Collective: every process in the cluster must call [`init`] and
/// [`finalize`] the same number of times, in the same order, since both
/// cross a transport barrier.
pub struct Context<T, P> {
    transport: T,
    partitioner: P,
}

impl<T: Transport, P: Partitioner> Context<T, P> {
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn partitioner(&mut self) -> &mut P {
        &mut self.partitioner
    }

    /// Consumes the context, running the collective barrier that closes out
    /// this process's participation in the cluster (spec §6: "finalize()
    /// that releases both; both are collective").
    pub fn finalize(self) -> Result<(), Error> {
        self.transport.barrier()?;
        Ok(())
    }
}

/// Collective: every process must call this with a transport handle already
/// addressed to its own rank (e.g. one element of
/// `ProcessTransport::new_cluster`) and the partitioner it will use for
/// every `distribute` call in this run.
pub fn init<T: Transport, P: Partitioner>(transport: T, partitioner: P) -> Result<Context<T, P>, Error> {
    transport.barrier()?;
    Ok(Context { transport, partitioner })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::StaticPartitioner;
    use fpmas_transport::ProcessTransport;

    #[test]
    fn init_and_finalize_round_trip() {
        let cluster = ProcessTransport::new_cluster(1);
        let t = cluster.into_iter().next().unwrap();
        let context = init(t, StaticPartitioner).unwrap();
        context.finalize().unwrap();
    }
}
