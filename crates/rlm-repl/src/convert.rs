//! Python ⇄ JSON conversion at the agent boundary.
//!
//! Terminal values cross parent/child interpreters as `serde_json::Value` and
//! are re-materialized as native Python objects on the other side, so a list
//! stays a list and a dict stays a dict rather than collapsing to a repr
//! string.

use rustpython_vm as vm;
use serde_json::{Map, Number, Value};
use vm::builtins::{PyDict, PyList, PyTuple};
use vm::{PyObjectRef, PyResult, VirtualMachine};

pub fn py_to_json(vm: &VirtualMachine, obj: &PyObjectRef) -> PyResult<Value> {
    let types = &vm.ctx.types;

    if vm.is_none(obj) {
        return Ok(Value::Null);
    }
    // bool first: it is an int subtype
    if obj.is_instance(types.bool_type.as_ref(), vm)? {
        return Ok(Value::Bool(obj.try_to_value::<bool>(vm)?));
    }
    if obj.is_instance(types.int_type.as_ref(), vm)? {
        // ints beyond i64 degrade to their decimal string
        return Ok(match obj.try_to_value::<i64>(vm) {
            Ok(n) => Value::from(n),
            Err(_) => Value::String(obj.str(vm)?.as_str().to_owned()),
        });
    }
    if obj.is_instance(types.float_type.as_ref(), vm)? {
        let f = obj.try_to_value::<f64>(vm)?;
        return Ok(Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null));
    }
    if obj.is_instance(types.str_type.as_ref(), vm)? {
        return Ok(Value::String(obj.try_to_value::<String>(vm)?));
    }
    if let Ok(list) = obj.clone().downcast::<PyList>() {
        let items = list.borrow_vec().to_vec();
        let converted = items
            .iter()
            .map(|item| py_to_json(vm, item))
            .collect::<PyResult<Vec<_>>>()?;
        return Ok(Value::Array(converted));
    }
    if let Ok(tuple) = obj.clone().downcast::<PyTuple>() {
        let converted = tuple
            .as_slice()
            .iter()
            .map(|item| py_to_json(vm, item))
            .collect::<PyResult<Vec<_>>>()?;
        return Ok(Value::Array(converted));
    }
    if let Ok(dict) = obj.clone().downcast::<PyDict>() {
        let mut map = Map::new();
        for (key, value) in dict {
            map.insert(key.str(vm)?.as_str().to_owned(), py_to_json(vm, &value)?);
        }
        return Ok(Value::Object(map));
    }

    // anything else degrades to its repr
    Ok(Value::String(obj.repr(vm)?.as_str().to_owned()))
}

pub fn json_to_py(vm: &VirtualMachine, value: &Value) -> PyResult<PyObjectRef> {
    Ok(match value {
        Value::Null => vm.ctx.none(),
        Value::Bool(b) => vm.ctx.new_bool(*b).into(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                vm.ctx.new_int(i).into()
            } else if let Some(u) = n.as_u64() {
                vm.ctx.new_int(u).into()
            } else {
                vm.ctx.new_float(n.as_f64().unwrap_or(f64::NAN)).into()
            }
        }
        Value::String(s) => vm.ctx.new_str(s.as_str()).into(),
        Value::Array(items) => {
            let elems = items
                .iter()
                .map(|item| json_to_py(vm, item))
                .collect::<PyResult<Vec<_>>>()?;
            vm.ctx.new_list(elems).into()
        }
        Value::Object(map) => {
            let dict = vm.ctx.new_dict();
            for (key, item) in map {
                dict.set_item(key.as_str(), json_to_py(vm, item)?, vm)?;
            }
            dict.into()
        }
    })
}
