#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use canon_engines::signal::SignalProbe;
use canon_kernel_contracts::calib::RuntimeLayers;
use canon_kernel_contracts::chunk::ChunkId;
use canon_kernel_contracts::phase::{CanonInputRecord, IngestDraft};
use canon_kernel_contracts::plan::ExecutionPlan;
use canon_kernel_contracts::question::QuestionCatalog;
use canon_storage::AuditLedger;

use crate::adapter::{AdapterInput, CanonAdapter};
use crate::context::RuntimeContext;
use crate::ph0gate::Ph0InputGate;
use crate::ph1canon::{Ph1CanonIngest, Ph1Input};
use crate::ph2micro::Ph2MicroResolve;
use crate::ph3route::Ph3ChunkRoute;
use crate::ph6schema::Ph6SchemaValidate;
use crate::ph7task::{Ph7TaskConstruct, TaskConstructionInput};
use crate::ph8plan::{Ph8PlanAssemble, PlanAssemblyInput};
use crate::phase::{run_phase, Clock, PhaseLedger, PipelineError};

/// Everything a run consumes from the external collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineInput {
    pub record: CanonInputRecord,
    pub draft: IngestDraft,
    pub catalog: QuestionCatalog,
    pub catalog_raw: Vec<u8>,
    pub layers_by_chunk: BTreeMap<ChunkId, RuntimeLayers>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    pub plan: ExecutionPlan,
    pub phases: PhaseLedger,
}

/// The orchestrator: one instance per phase, called in fixed order. A
/// phase that does not report success stops the run; the phase ledger
/// additionally refuses any skipped or reordered execution.
pub struct CanonPipeline<P>
where
    P: SignalProbe,
{
    gate: Ph0InputGate,
    ingest: Ph1CanonIngest,
    adapter: CanonAdapter,
    micro: Ph2MicroResolve,
    route: Ph3ChunkRoute,
    schema: Ph6SchemaValidate,
    construct: Ph7TaskConstruct<P>,
    assemble: Ph8PlanAssemble,
}

impl<P> CanonPipeline<P>
where
    P: SignalProbe,
{
    pub fn new(probe: P, context: Arc<RuntimeContext>) -> Self {
        Self {
            gate: Ph0InputGate,
            ingest: Ph1CanonIngest,
            adapter: CanonAdapter,
            micro: Ph2MicroResolve,
            route: Ph3ChunkRoute,
            schema: Ph6SchemaValidate,
            construct: Ph7TaskConstruct::new(probe),
            assemble: Ph8PlanAssemble::new(context),
        }
    }

    pub fn run(
        &self,
        input: PipelineInput,
        clock: &dyn Clock,
        audit: &mut AuditLedger,
    ) -> Result<PipelineRun, PipelineError> {
        let mut phases = PhaseLedger::new();

        let validated = run_phase(&self.gate, input.record, clock, &mut phases)?;
        let questionnaire_hash = validated.payload.record.questionnaire_hash.clone();

        let package = run_phase(
            &self.ingest,
            Ph1Input {
                validated: validated.payload,
                draft: input.draft,
            },
            clock,
            &mut phases,
        )?;

        let micro_input = run_phase(
            &self.adapter,
            AdapterInput {
                package: package.payload,
                catalog: input.catalog,
                catalog_raw: input.catalog_raw,
                questionnaire_hash,
            },
            clock,
            &mut phases,
        )?;

        let questions = run_phase(&self.micro, micro_input.payload, clock, &mut phases)?;
        let routed = run_phase(&self.route, questions.payload, clock, &mut phases)?;
        let checked = run_phase(&self.schema, routed.payload, clock, &mut phases)?;

        let tasks = run_phase(
            &self.construct,
            TaskConstructionInput {
                set: checked.payload,
                now: clock.now(),
            },
            clock,
            &mut phases,
        )?;

        let task_audit = tasks.payload.audit.clone();
        let bundle = run_phase(
            &self.assemble,
            PlanAssemblyInput {
                tasks: tasks.payload,
                layers_by_chunk: input.layers_by_chunk,
                now: clock.now(),
            },
            clock,
            &mut phases,
        )?;

        audit.append_all(task_audit)?;
        audit.append_all(bundle.payload.audit)?;

        Ok(PipelineRun {
            plan: bundle.payload.plan,
            phases,
        })
    }
}
