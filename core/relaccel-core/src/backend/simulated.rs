use super::{
    AggregateRequest, Backend, GroupByRequest, JoinRequest, Predicate, SortRequest, host,
};
use crate::config::BackendKind;
use crate::device::DeviceBuffer;
use crate::error::AccelResult;

/// Runs every primitive with the host kernels. Needs no hardware and is
/// fully deterministic.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedBackend;

impl Backend for SimulatedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Simulated
    }

    fn filter(
        &self,
        input: &DeviceBuffer,
        output: &mut DeviceBuffer,
        predicate: &Predicate,
    ) -> AccelResult<()> {
        host::filter(input, output, predicate)
    }

    fn join(
        &self,
        left: &DeviceBuffer,
        right: &DeviceBuffer,
        output: &mut DeviceBuffer,
        request: &JoinRequest,
    ) -> AccelResult<()> {
        host::join(left, right, output, request)
    }

    fn aggregate(
        &self,
        input: &DeviceBuffer,
        output: &mut DeviceBuffer,
        request: &AggregateRequest,
    ) -> AccelResult<()> {
        host::aggregate(input, output, request)
    }

    fn sort(
        &self,
        input: &DeviceBuffer,
        output: &mut DeviceBuffer,
        request: &SortRequest,
    ) -> AccelResult<()> {
        host::sort(input, output, request)
    }

    fn group_by(
        &self,
        input: &DeviceBuffer,
        output: &mut DeviceBuffer,
        request: &GroupByRequest,
    ) -> AccelResult<()> {
        host::group_by(input, output, request)
    }
}
