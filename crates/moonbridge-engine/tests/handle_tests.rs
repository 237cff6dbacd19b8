//! Reference Handle Tests
//!
//! Tests for handles to values living inside the VM:
//! - Identity equality and cloning
//! - Table, function and coroutine capabilities
//! - Handles keeping values alive across collections
//! - Stack balance under nested guards
//!
//! # Running Tests
//! ```bash
//! cargo test --test handle_tests
//! ```

use moonbridge_engine::{LuaRef, LuaState, LuaType, Nil};

// ===== Identity =====

#[test]
fn test_same_value_compares_equal() {
    let state = LuaState::new().unwrap();
    assert!(state.do_string("shared = {}"));
    let a = state.global("shared").unwrap().get_ref().unwrap();
    let b = state.global("shared").unwrap().get_ref().unwrap();
    assert_eq!(a, b);

    let copy = state.eval("return { }").unwrap();
    assert_ne!(a, copy[0]);
}

#[test]
fn test_strings_compare_by_value_identity() {
    let state = LuaState::new().unwrap();
    let a = state.new_ref("moon").unwrap();
    let b = state.new_ref("moon").unwrap();
    // Short strings are interned: same value
    assert_eq!(a, b);
}

#[test]
fn test_handles_from_different_states_differ() {
    let a = LuaState::new().unwrap();
    let b = LuaState::new().unwrap();
    assert_ne!(a.new_ref(1i64).unwrap(), b.new_ref(1i64).unwrap());
}

// ===== Lifetime =====

#[test]
fn test_handle_keeps_value_alive() {
    let state = LuaState::new().unwrap();
    let table = state.new_table().unwrap();
    table.set("payload", "kept").unwrap();
    state.garbage_collect();
    state.garbage_collect();
    assert_eq!(table.get::<_, String>("payload").unwrap(), "kept");
}

#[test]
fn test_dropping_handles_releases_memory() {
    let state = LuaState::new().unwrap();
    state.garbage_collect();
    let baseline = state.gc().used_bytes();

    let handles: Vec<LuaRef<'_>> = (0..200)
        .map(|_| {
            let t = state.new_table_with(64, 0).unwrap();
            for i in 1..=64i64 {
                t.raw_set(i, i).unwrap();
            }
            t.into()
        })
        .collect();
    state.garbage_collect();
    let loaded = state.gc().used_bytes();
    assert!(loaded > baseline);

    drop(handles);
    state.garbage_collect();
    assert!(state.gc().used_bytes() < loaded);
}

// ===== Capabilities =====

#[test]
fn test_global_function_call() {
    let state = LuaState::new().unwrap();
    assert!(state.do_string("function add(a, b) return a + b end"));
    let sum = state.global("add").unwrap().call((2i64, 3i64)).unwrap();
    assert_eq!(sum[0].get::<i64>().unwrap(), 5);
}

#[test]
fn test_table_handle_from_results() {
    let state = LuaState::new().unwrap();
    let results = state.eval("return { 10, 20, 30, name = 'list' }").unwrap();
    let table = results[0].clone().into_table().unwrap();
    assert_eq!(table.raw_len(), 3);
    assert_eq!(table.get::<_, String>("name").unwrap(), "list");
    assert_eq!(table.pairs().unwrap().len(), 4);
}

#[test]
fn test_type_queries() {
    let state = LuaState::new().unwrap();
    let values = state
        .eval("return nil, true, 1, 'x', {}, print, coroutine.create(print)")
        .unwrap();
    let types: Vec<LuaType> = values.iter().map(|v| v.lua_type()).collect();
    assert_eq!(
        types,
        vec![
            LuaType::Nil,
            LuaType::Boolean,
            LuaType::Number,
            LuaType::String,
            LuaType::Table,
            LuaType::Function,
            LuaType::Thread,
        ]
    );
    assert!(values[0].is_nil());
    assert_eq!(values[5].type_name(), "function");
}

#[test]
fn test_option_conversion() {
    let state = LuaState::new().unwrap();
    let nil = state.new_ref(Nil).unwrap();
    assert_eq!(nil.get::<Option<i64>>().unwrap(), None);
    let one = state.new_ref(Some(1i64)).unwrap();
    assert_eq!(one.get::<Option<i64>>().unwrap(), Some(1));
}

// ===== Stack discipline =====

#[test]
fn test_guarded_operations_inside_outer_guard() {
    let state = LuaState::new().unwrap();
    state.set_error_handler(|_, _| {});
    let outer = state.stack_guard();
    state.push("outer value").unwrap();
    let height = state.stack_top();

    let table = state.new_table().unwrap();
    table.set("k", 1i64).unwrap();
    let _ = table.set(Nil, 1i64);
    let _ = table.get::<_, i64>("missing");
    let _ = state.global("print").unwrap().call("from test");
    let _ = state.eval("error('x')");
    let co = state.new_thread_with(&state.load_string("return 1")).unwrap();
    let _ = co.resume(());
    let _ = co.resume(());
    assert_eq!(state.stack_top(), height);

    drop(outer);
    assert_eq!(state.stack_top(), 0);
}
