use crate::error::{RemoteError, Result};
use crate::value::{PropertyKey, Value};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::IntoFuture;

/// Pipeline step over a value that is already here
#[derive(Debug, Clone)]
pub struct LocalPromise {
    outcome: Result<Value>,
    /// Object the value was read from, bound as `this` by `call`
    receiver: Option<Value>,
}

impl LocalPromise {
    pub fn resolved(value: Value) -> Self {
        Self {
            outcome: Ok(value),
            receiver: None,
        }
    }

    pub fn rejected(error: RemoteError) -> Self {
        Self {
            outcome: Err(error),
            receiver: None,
        }
    }

    pub fn from_result(outcome: Result<Value>) -> Self {
        Self {
            outcome,
            receiver: None,
        }
    }

    pub fn get(&self, key: impl Into<Value>) -> LocalPromise {
        let base = match &self.outcome {
            Ok(base) => base,
            Err(err) => return Self::rejected(err.clone()),
        };
        let key = PropertyKey::from_value(&key.into());
        Self {
            outcome: base.get_property(&key),
            receiver: Some(base.clone()),
        }
    }

    pub fn call(&self, arguments: &[Value]) -> LocalPromise {
        let this = self.receiver.clone().unwrap_or_default();
        self.call_with(&this, arguments)
    }

    pub fn call_with(&self, this: &Value, arguments: &[Value]) -> LocalPromise {
        match &self.outcome {
            Ok(function) => Self::from_result(function.call(this, arguments)),
            Err(err) => Self::rejected(err.clone()),
        }
    }

    pub fn construct(&self, arguments: &[Value]) -> LocalPromise {
        match &self.outcome {
            Ok(constructor) => Self::from_result(constructor.construct(arguments)),
            Err(err) => Self::rejected(err.clone()),
        }
    }

    /// Final value; promise values are awaited
    pub async fn resolve(&self) -> Result<Value> {
        let value = self.outcome.clone()?;
        let pending = value.as_object().and_then(|object| object.as_promise()).cloned();
        match pending {
            Some(cell) => cell.settled().await.map_err(RemoteError::from_value),
            None => Ok(value),
        }
    }
}

impl IntoFuture for LocalPromise {
    type Output = Result<Value>;
    type IntoFuture = BoxFuture<'static, Result<Value>>;

    fn into_future(self) -> Self::IntoFuture {
        async move { self.resolve().await }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectRef;

    #[tokio::test]
    async fn test_method_call_binds_receiver() {
        let counter = ObjectRef::new_object().with("step", 2).with(
            "next",
            ObjectRef::function("next", |this, args| {
                let step = this.get_property(&"step".into())?.as_number().unwrap_or(0.0);
                let base = args.first().and_then(Value::as_number).unwrap_or(0.0);
                Ok(Value::Number(base + step))
            }),
        );

        let result = LocalPromise::resolved(Value::from(counter))
            .get("next")
            .call(&[Value::from(40)])
            .await
            .unwrap();
        assert_eq!(result, Value::from(42));
    }

    #[tokio::test]
    async fn test_rejections_propagate() {
        let promise = LocalPromise::resolved(Value::Undefined).get("missing").get("deeper");
        let err = promise.await.unwrap_err();
        assert!(err.is_type_error());
    }

    #[tokio::test]
    async fn test_promise_values_are_awaited() {
        let rejected = ObjectRef::rejected_promise(Value::from(123));
        let err = LocalPromise::resolved(Value::from(rejected)).await.unwrap_err();
        assert_eq!(err, RemoteError::Thrown(Value::from(123)));
    }
}
