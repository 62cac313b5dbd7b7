use sb_core::{GlobalAddress, StepBlocksError};
use tracing::debug;

use super::FlowEngine;
use crate::records::RecordReader;

impl FlowEngine {
    /// `loadJsonVars` / `loadXmlVars`: copies one record into the variables. With a
    /// selector the first record satisfying it is used; without one the file must
    /// hold exactly one record.
    pub(super) fn load_vars(
        &mut self,
        addr: GlobalAddress,
        path: &str,
        selector: &str,
        desc: &str,
        mut reader: Box<dyn RecordReader>,
    ) -> Result<(), StepBlocksError> {
        if path.is_empty() {
            return Err(StepBlocksError::assertion(
                "ENGINE_LOAD_INVALID",
                format!("Requires a file path to load each {} from.", desc),
            ));
        }
        let path = self.resolve_data_path(addr, path);
        reader.load(&path)?;
        reader.next(&mut self.vars)?;

        if selector.is_empty() {
            if !reader.eof() {
                return Err(StepBlocksError::assertion(
                    "ENGINE_RECORD_MULTIPLE",
                    format!(
                        "Multiple {}s are not valid for this command. (A specific {} can be selected by specifying: name=\"value\".)",
                        desc, desc
                    ),
                ));
            }
            return Ok(());
        }

        while !self.eval_condition(selector)? {
            if reader.eof() {
                return Err(StepBlocksError::assertion(
                    "ENGINE_RECORD_NOT_FOUND",
                    format!(
                        "{} not found for selector expression: {}; in input file {}",
                        desc,
                        selector,
                        path.display()
                    ),
                ));
            }
            reader.next(&mut self.vars)?;
        }
        debug!(path = %path.display(), selector, "record selected");
        Ok(())
    }
}
