use aws_sdk_dynamodb::types::AttributeValue;
use model::record::{COMPLETED_AT, JOB_ID, JOB_STATUS, MESSAGE, OUTPUT_KEY, PARENT_JOB_ID, UPDATED_AT};
use model::update::JobUpdate;
use serde::Serialize;
use std::collections::HashMap;

/// Only update records which already exist
pub(crate) const JOB_EXISTS: &str = "attribute_exists(#id)";

/// A `SET` expression covering only the fields present in an update.
/// Every attribute goes through a `#name` placeholder to avoid reserved words.
#[derive(Debug)]
pub(crate) struct UpdateExpression {
    pub(crate) expression: String,
    pub(crate) names: HashMap<String, String>,
    pub(crate) values: HashMap<String, AttributeValue>,
}

impl UpdateExpression {
    pub(crate) fn from_update(update: &JobUpdate) -> Result<Self, serde_dynamo::Error> {
        let mut builder = UpdateExpression {
            expression: String::new(),
            names: HashMap::from([(format!("#{JOB_ID}"), JOB_ID.to_string())]),
            values: HashMap::new(),
        };

        if let Some(status) = &update.status {
            builder.set(JOB_STATUS, status)?;
        }
        if let Some(message) = &update.message {
            builder.set(MESSAGE, message)?;
        }
        if let Some(output_key) = &update.output_key {
            builder.set(OUTPUT_KEY, output_key)?;
        }
        if let Some(parent_job_id) = &update.parent_job_id {
            builder.set(PARENT_JOB_ID, parent_job_id)?;
        }
        if let Some(completed_at) = &update.completed_at {
            builder.set(COMPLETED_AT, completed_at)?;
        }
        builder.set(UPDATED_AT, &update.updated_at)?;

        Ok(builder)
    }

    fn set<T: Serialize>(&mut self, attribute: &str, value: &T) -> Result<(), serde_dynamo::Error> {
        // Same representation the attribute has when the record is first written
        let value: AttributeValue = serde_dynamo::to_attribute_value(value)?;

        self.expression.push_str(if self.expression.is_empty() { "SET " } else { ", " });
        self.expression.push_str(&format!("#{attribute} = :{attribute}"));
        self.names.insert(format!("#{attribute}"), attribute.to_string());
        self.values.insert(format!(":{attribute}"), value);

        Ok(())
    }
}
