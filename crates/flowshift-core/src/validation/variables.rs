use flowshift_types::TypedValue;

use crate::error::PlanViolation;

pub(crate) fn check(name: &str, value: &TypedValue) -> Result<(), PlanViolation> {
    if value.is_java_serialized() {
        return Err(PlanViolation::JavaSerializedVariable {
            name: name.to_string(),
        });
    }
    Ok(())
}
