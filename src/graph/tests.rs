use super::{
    AttrName, AttrValue, Graph, GraphError, NodeId, NodeKind, Tensor, TensorShape, Use,
};

/// Return the kinds of nodes in the node list, in order.
fn node_kinds(graph: &Graph) -> Vec<NodeKind> {
    graph.iter().map(|(_, node)| node.kind()).collect()
}

#[test]
fn test_build_graph() {
    let mut graph = Graph::new();
    let x = graph.add_input([2, 3]);
    let y = graph.add_input(TensorShape::Unknown);
    let add = graph.append_node(NodeKind::Add, &[x, y], 1);
    let add_out = graph.node(add).output();
    graph.register_output(add_out);

    assert_eq!(graph.len(), 1);
    assert_eq!(graph.input_ids(), &[x, y]);
    assert_eq!(graph.output_ids(), &[add_out]);
    assert_eq!(graph.value(x).shape(), &TensorShape::Known(vec![2, 3]));
    assert_eq!(graph.source_node(x).0, graph.param_node());
    assert_eq!(graph.source_kind(add_out), NodeKind::Add);
    assert_eq!(graph.value(add_out).offset(), 0);

    assert_eq!(graph.uses(x), &[Use { user: add, offset: 0 }]);
    assert_eq!(graph.uses(y), &[Use { user: add, offset: 1 }]);
    assert_eq!(
        graph.uses(add_out),
        &[Use {
            user: graph.return_node(),
            offset: 0
        }]
    );
    assert!(graph.check().is_ok());
}

#[test]
fn test_insert_before_and_after() {
    let mut graph = Graph::new();
    let x = graph.add_input([4]);
    let relu = graph.append_node(NodeKind::Relu, &[x], 1);

    let tanh = graph.create(NodeKind::Tanh, 1);
    graph.push_input(tanh, x);
    graph.insert_before(tanh, relu);

    let sigmoid = graph.create(NodeKind::Sigmoid, 1);
    graph.push_input(sigmoid, x);
    graph.insert_after(sigmoid, tanh);

    assert_eq!(
        node_kinds(&graph),
        [NodeKind::Tanh, NodeKind::Sigmoid, NodeKind::Relu]
    );
    assert_eq!(graph.first_node(), Some(tanh));
    assert_eq!(graph.last_node(), Some(relu));
    assert_eq!(graph.next_node(tanh), Some(sigmoid));
    assert_eq!(graph.prev_node(relu), Some(sigmoid));
    assert!(graph.check().is_ok());
}

#[test]
#[should_panic(expected = "is already in the node list")]
fn test_insert_twice() {
    let mut graph = Graph::new();
    let x = graph.add_input([4]);
    let relu = graph.append_node(NodeKind::Relu, &[x], 1);
    graph.append(relu);
}

#[test]
fn test_replace_input() {
    let mut graph = Graph::new();
    let x = graph.add_input([4]);
    let y = graph.add_input([4]);
    let mul = graph.append_node(NodeKind::Mul, &[x, x], 1);

    let old = graph.replace_input(mul, 1, y);

    assert_eq!(old, x);
    assert_eq!(graph.node(mul).inputs(), &[x, y]);
    assert_eq!(graph.uses(x), &[Use { user: mul, offset: 0 }]);
    assert_eq!(graph.uses(y), &[Use { user: mul, offset: 1 }]);
    assert!(graph.check().is_ok());
}

#[test]
fn test_replace_all_uses_with() {
    let mut graph = Graph::new();
    let x = graph.add_input([4]);
    let relu = graph.append_node(NodeKind::Relu, &[x], 1);
    let relu_out = graph.node(relu).output();
    let tanh = graph.append_node(NodeKind::Tanh, &[relu_out], 1);
    let add = graph.append_node(NodeKind::Add, &[relu_out, relu_out], 1);
    graph.register_output(relu_out);

    graph.replace_all_uses_with(relu_out, x);

    assert!(!graph.has_uses(relu_out));
    assert_eq!(graph.node(tanh).inputs(), &[x]);
    assert_eq!(graph.node(add).inputs(), &[x, x]);
    assert_eq!(graph.output_ids(), &[x]);
    assert_eq!(graph.uses(x).len(), 5);
    assert!(graph.check().is_ok());
}

#[test]
fn test_replace_first_use_with() {
    let mut graph = Graph::new();
    let x = graph.add_input([4]);
    let y = graph.add_input([4]);
    let first = graph.append_node(NodeKind::Relu, &[x], 1);
    let second = graph.append_node(NodeKind::Tanh, &[x], 1);

    graph.replace_first_use_with(x, y);

    assert_eq!(graph.node(first).inputs(), &[y]);
    assert_eq!(graph.node(second).inputs(), &[x]);
    assert_eq!(
        graph.uses(x),
        &[Use {
            user: second,
            offset: 0
        }]
    );
    assert!(graph.check().is_ok());
}

#[test]
fn test_remove_all_inputs() {
    let mut graph = Graph::new();
    let x = graph.add_input([4]);
    let y = graph.add_input([4]);
    let add = graph.append_node(NodeKind::Add, &[x, y], 1);

    graph.remove_all_inputs(add);

    assert!(graph.node(add).inputs().is_empty());
    assert!(!graph.has_uses(x));
    assert!(!graph.has_uses(y));
    assert!(graph.check().is_ok());
}

#[test]
fn test_destroy() {
    let mut graph = Graph::new();
    let x = graph.add_input([4]);
    let relu = graph.append_node(NodeKind::Relu, &[x], 1);
    let relu_out = graph.node(relu).output();

    graph.destroy(relu);

    assert!(graph.get_node(relu).is_none());
    assert!(graph.get_value(relu_out).is_none());
    assert!(!graph.has_uses(x));
    assert!(graph.is_empty());
    assert_eq!(graph.first_node(), None);
    assert_eq!(graph.last_node(), None);
    assert!(graph.check().is_ok());
}

#[test]
#[should_panic(expected = "cannot destroy Relu node n2: output %1 still has uses")]
fn test_destroy_used_node() {
    let mut graph = Graph::new();
    let x = graph.add_input([4]);
    let relu = graph.append_node(NodeKind::Relu, &[x], 1);
    let relu_out = graph.node(relu).output();
    graph.register_output(relu_out);
    graph.destroy(relu);
}

#[test]
fn test_cursor_visits_inserted_nodes() {
    let mut graph = Graph::new();
    let x = graph.add_input([4]);
    let relu = graph.append_node(NodeKind::Relu, &[x], 1);

    let mut visited = Vec::new();
    let mut cursor = graph.cursor();
    while let Some(id) = cursor.advance(&graph) {
        visited.push(graph.node(id).kind());
        if id == relu {
            let tanh = graph.create(NodeKind::Tanh, 1);
            graph.push_input(tanh, x);
            graph.insert_after(tanh, relu);
        }
    }

    assert_eq!(visited, [NodeKind::Relu, NodeKind::Tanh]);
    assert_eq!(cursor.current(), None);
}

#[test]
fn test_cursor_destroy_current() {
    let mut graph = Graph::new();
    let x = graph.add_input([4]);
    let mut ids: Vec<NodeId> = Vec::new();
    for kind in [NodeKind::Relu, NodeKind::Tanh, NodeKind::Sigmoid, NodeKind::Relu] {
        ids.push(graph.append_node(kind, &[x], 1));
    }

    // Destroy the first node, a middle node and the last node.
    let mut visited = Vec::new();
    let mut cursor = graph.cursor();
    while let Some(id) = cursor.advance(&graph) {
        visited.push(id);
        if graph.node(id).kind() != NodeKind::Tanh {
            cursor.destroy_current(&mut graph);
        }
    }

    assert_eq!(visited, ids);
    assert_eq!(node_kinds(&graph), [NodeKind::Tanh]);
    assert!(graph.check().is_ok());
}

#[test]
fn test_check_reports_use_of_later_value() {
    let mut graph = Graph::new();
    let x = graph.add_input([4]);
    let relu = graph.append_node(NodeKind::Relu, &[x], 1);
    let tanh = graph.append_node(NodeKind::Tanh, &[x], 1);
    let tanh_out = graph.node(tanh).output();

    graph.replace_input(relu, 0, tanh_out);

    assert_eq!(
        graph.check(),
        Err(GraphError::NotTopological {
            node: relu,
            value: tanh_out
        })
    );
}

#[test]
fn test_check_reports_value_from_detached_node() {
    let mut graph = Graph::new();
    let x = graph.add_input([4]);
    let detached = graph.create(NodeKind::Relu, 1);
    graph.push_input(detached, x);
    let detached_out = graph.node(detached).output();
    let tanh = graph.append_node(NodeKind::Tanh, &[detached_out], 1);

    let err = graph.check().unwrap_err();
    assert_eq!(
        err,
        GraphError::NotTopological {
            node: tanh,
            value: detached_out
        }
    );
    assert_eq!(
        err.to_string(),
        format!("node {} uses value {} before it is produced", tanh, detached_out)
    );
}

#[test]
fn test_check_reports_use_from_detached_node() {
    let mut graph = Graph::new();
    let x = graph.add_input([4]);
    graph.append_node(NodeKind::Relu, &[x], 1);

    // A created-but-never-inserted node records a use of `x` that no node in
    // the list accounts for.
    let detached = graph.create(NodeKind::Tanh, 1);
    graph.push_input(detached, x);

    assert_eq!(graph.check(), Err(GraphError::UseListMismatch { value: x }));
}

#[test]
fn test_display() {
    let mut graph = Graph::new();
    let x = graph.add_input([2, 3]);
    let transpose = graph.append_node(NodeKind::Transpose, &[x], 1);
    graph
        .node_mut(transpose)
        .set_attr(AttrName::Perm, AttrValue::Ints(vec![1, 0]));
    let transpose_out = graph.node(transpose).output();
    graph.set_shape(transpose_out, [3, 2]);

    let constant = graph.append_node(NodeKind::Constant, &[], 1);
    graph.node_mut(constant).set_attr(
        AttrName::Value,
        AttrValue::Tensor(Tensor::vector_i64(&[3, 2])),
    );
    let shape = graph.node(constant).output();
    let expand = graph.append_node(NodeKind::Expand, &[transpose_out, shape], 1);
    graph.register_output(graph.node(expand).output());

    let expected = "graph(%0 : [2, 3]) {
  %1 : [3, 2] = Transpose[perm=[1, 0]](%0)
  %2 = Constant[value=i64[2] [3, 2]]()
  %3 = Expand(%1, %2)
  return (%3)
}";
    assert_eq!(graph.to_string(), expected);
}
