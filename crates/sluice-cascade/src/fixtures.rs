//! Pipelines, trainers and evaluators shared by the unit tests.

use serde_json::json;
use sluice_graph::node::{
    GlueBlock, HashJoinParams, StringTransform, TableShape, ThresholdPolicy, VectorizerParams,
};
use sluice_graph::{
    Column, ColumnSetType, FrameType, Graph, InputSlot, ModelInputs, ModelNode, ModelOp, Node, NodeBuilder,
    NodeId, NodeKind, ScalarKind, TypeEnv, ValueType,
};

use crate::artifact::{CascadeArtifact, ModelSlot};
use crate::config::CascadeConfig;
use crate::cost::CostModel;
use crate::error::BoxedError;
use crate::extract::RowGate;
use crate::importance::{CascadeTrainer, TrainingData};
use crate::interpret::{NodeEvaluator, Value};
use crate::matrix::{CsrMatrix, DenseMatrix, FeatureMatrix};
use crate::rewrite::{BIG_MODEL, SMALL_MODEL};
use crate::score::FeatureScores;

/// What the mock big model predicts for every row.
pub const BIG_MODEL_PREDICTION: f64 = 0.25;

/// Text classifier over three vectorized fields of one lowered string.
pub struct TextPipeline {
    pub graph: Graph,
    pub env: TypeEnv,
    pub plan: Vec<NodeId>,
    pub text: NodeId,
    pub labels: Option<NodeId>,
    pub lowered: NodeId,
    pub title: NodeId,
    pub description: NodeId,
    pub chars: NodeId,
    pub features: NodeId,
    pub model: NodeId,
    pub output: NodeId,
}

/// Recommender over a frame joined with two tables and a glue-computed
/// score.
pub struct FramePipeline {
    pub graph: Graph,
    pub env: TypeEnv,
    pub plan: Vec<NodeId>,
    pub df: NodeId,
    pub users: NodeId,
    pub songs: NodeId,
    pub extra: NodeId,
    pub features: NodeId,
    pub model: NodeId,
    pub output: NodeId,
}

/// How [`table_pipeline`] turns its two glue-computed tables into features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFeatures {
    /// Each frame materialized, stacked and passed through an identity.
    DenseStack,
    /// Both frames concatenated column-wise.
    FrameConcat,
    /// Column sets concatenated, reordered and reshaped into a matrix.
    ColumnSet,
}

/// Model over two tables derived from one raw frame by glue; `x2` is the
/// costly one.
pub struct TablePipeline {
    pub graph: Graph,
    pub env: TypeEnv,
    pub plan: Vec<NodeId>,
    pub df: NodeId,
    pub labels: Option<NodeId>,
    pub x1: NodeId,
    pub x2: NodeId,
    pub features: NodeId,
    pub model: NodeId,
    pub output: NodeId,
}

fn add(graph: &mut Graph, env: &mut TypeEnv, builder: NodeBuilder) -> NodeId {
    graph.add(env, builder).unwrap()
}

fn strings() -> ValueType {
    ValueType::vector(ValueType::Str)
}

fn vectorizer(vocabulary: usize, ngram_range: (usize, usize)) -> NodeKind {
    NodeKind::Vectorizer(VectorizerParams {
        vocabulary,
        ngram_range,
        tfidf: false,
        row_gate: None,
    })
}

/// Adds the model node, a label input when training, and the output.
fn add_model(
    graph: &mut Graph,
    env: &mut TypeEnv,
    op: ModelOp,
    features: NodeId,
    inputs: ModelInputs,
) -> (Option<NodeId>, NodeId, NodeId) {
    let labels = (op == ModelOp::Train).then(|| {
        add(
            graph,
            env,
            Node::builder(NodeKind::Input).with_output("labels", ValueType::doubles()),
        )
    });
    let (name, ty) = match op {
        ModelOp::Train => ("trained_model", ValueType::Handle),
        ModelOp::Predict | ModelOp::PredictProba => ("preds", ValueType::doubles()),
    };
    let mut builder = Node::builder(NodeKind::Model(ModelNode::new("model", op, inputs)))
        .with_input(features, graph.primary_output(features).unwrap().name.clone());
    if let Some(labels) = labels {
        builder = builder.with_input(labels, "labels");
    }
    let model = add(graph, env, builder.with_output(name, ty));
    let output = add(
        graph,
        env,
        Node::builder(NodeKind::Output).with_input(model, name),
    );
    (labels, model, output)
}

/// Plan listing every node in insertion order.
fn insertion_order(graph: &Graph) -> Vec<NodeId> {
    graph.nodes().map(|(id, _)| id).collect()
}

pub fn text_pipeline(op: ModelOp) -> TextPipeline {
    let mut graph = Graph::new();
    let mut env = TypeEnv::new();
    let text = add(
        &mut graph,
        &mut env,
        Node::builder(NodeKind::Input).with_output("text", strings()),
    );
    let lowered = add(
        &mut graph,
        &mut env,
        Node::builder(NodeKind::StringOp {
            op: StringTransform::Lower,
        })
        .with_input(text, "text")
        .with_output("lowered", strings()),
    );
    let mut field = |name: &str, ngram_range, cost: f64| {
        add(
            &mut graph,
            &mut env,
            Node::builder(vectorizer(10, ngram_range))
                .with_input(lowered, "lowered")
                .with_output(name, ValueType::SparseMatrix)
                .with_cost(cost),
        )
    };
    let title = field("title_vec", (1, 1), 1.0);
    let description = field("desc_vec", (1, 2), 2.0);
    let chars = field("char_vec", (2, 4), 3.0);
    let features = add(
        &mut graph,
        &mut env,
        Node::builder(NodeKind::StackSparse)
            .with_input(title, "title_vec")
            .with_input(description, "desc_vec")
            .with_input(chars, "char_vec")
            .with_output("features", ValueType::SparseMatrix),
    );
    let inputs = ModelInputs::new([
        (title, InputSlot::Range { start: 0, end: 10 }),
        (description, InputSlot::Range { start: 10, end: 20 }),
        (chars, InputSlot::Range { start: 20, end: 30 }),
    ]);
    let (labels, model, output) = add_model(&mut graph, &mut env, op, features, inputs);

    // Labels are read by the model only; list them right after the text.
    let mut plan = insertion_order(&graph);
    if let Some(labels) = labels {
        plan.retain(|&id| id != labels);
        plan.insert(1, labels);
    }
    TextPipeline {
        graph,
        env,
        plan,
        text,
        labels,
        lowered,
        title,
        description,
        chars,
        features,
        model,
        output,
    }
}

pub fn frame_pipeline(op: ModelOp) -> FramePipeline {
    let mut graph = Graph::new();
    let mut env = TypeEnv::new();
    let long = ValueType::scalar(ScalarKind::Long);
    let raw = FrameType::new(vec![
        Column::new("user_id", long.clone()),
        Column::new("song_id", long),
    ])
    .unwrap();

    let df = add(
        &mut graph,
        &mut env,
        Node::builder(NodeKind::Input).with_output("df", ValueType::Frame(raw.clone())),
    );
    let user_join = HashJoinParams {
        join_cols: vec!["user_id".into()],
        right_table: "users".into(),
        left_type: raw,
        right_type: FrameType::doubles(["user_age", "user_city"]).unwrap(),
        row_gate: None,
    };
    let users_type = user_join.output_type().unwrap();
    let users = add(
        &mut graph,
        &mut env,
        Node::builder(NodeKind::HashJoin(user_join))
            .with_input(df, "df")
            .with_output("users_joined", ValueType::Frame(users_type.clone()))
            .with_cost(1.0),
    );
    let song_join = HashJoinParams {
        join_cols: vec!["song_id".into()],
        right_table: "songs".into(),
        left_type: users_type,
        right_type: FrameType::doubles(["song_len"]).unwrap(),
        row_gate: None,
    };
    let songs_type = song_join.output_type().unwrap();
    let songs = add(
        &mut graph,
        &mut env,
        Node::builder(NodeKind::HashJoin(song_join))
            .with_input(users, "users_joined")
            .with_output("songs_joined", ValueType::Frame(songs_type.clone()))
            .with_cost(1.0),
    );
    let extra_type = FrameType::doubles(["extra_score"]).unwrap();
    let extra = add(
        &mut graph,
        &mut env,
        Node::builder(NodeKind::Glue(GlueBlock::new("extra = compute_extra(df)", true)))
            .with_input(df, "df")
            .with_output("extra", ValueType::Frame(extra_type.clone())),
    );
    let columns = ["song_id", "user_age", "user_city", "song_len", "extra_score"];
    let features_type = songs_type.concat(&extra_type).unwrap().select(&columns);
    let features = add(
        &mut graph,
        &mut env,
        Node::builder(NodeKind::ColumnSelect {
            shape: TableShape::Frame,
            columns: columns.iter().map(|column| (*column).to_owned()).collect(),
        })
        .with_input(songs, "songs_joined")
        .with_input(extra, "extra")
        .with_output("features", ValueType::Frame(features_type)),
    );
    let named = |columns: &[(&str, usize)]| {
        InputSlot::Named(
            columns
                .iter()
                .map(|(name, index)| ((*name).to_owned(), *index))
                .collect(),
        )
    };
    let inputs = ModelInputs::new([
        (df, named(&[("song_id", 0)])),
        (users, named(&[("user_age", 1), ("user_city", 2)])),
        (songs, named(&[("song_len", 3)])),
        (extra, named(&[("extra_score", 4)])),
    ]);
    let (_, model, output) = add_model(&mut graph, &mut env, op, features, inputs);
    let plan = insertion_order(&graph);

    FramePipeline {
        graph,
        env,
        plan,
        df,
        users,
        songs,
        extra,
        features,
        model,
        output,
    }
}

pub fn table_pipeline(op: ModelOp, shape: TableFeatures) -> TablePipeline {
    let mut graph = Graph::new();
    let mut env = TypeEnv::new();
    let double = ValueType::scalar(ScalarKind::Double);
    let df = add(
        &mut graph,
        &mut env,
        Node::builder(NodeKind::Input)
            .with_output("df", ValueType::Frame(FrameType::doubles(["a", "b"]).unwrap())),
    );
    let table = |name: &str| match shape {
        TableFeatures::ColumnSet => ValueType::ColumnSet(ColumnSetType::new(double.clone(), [name])),
        TableFeatures::DenseStack | TableFeatures::FrameConcat => {
            ValueType::Frame(FrameType::doubles([name]).unwrap())
        }
    };
    let mut glue = |name: &str| {
        let code = format!("{name} = derive_{name}(df)");
        add(
            &mut graph,
            &mut env,
            Node::builder(NodeKind::Glue(GlueBlock::new(code, true)))
                .with_input(df, "df")
                .with_output(name, table(name)),
        )
    };
    let x1 = glue("x1");
    let x2 = glue("x2");

    let features = match shape {
        TableFeatures::DenseStack => {
            let mut dense = |input: NodeId, from: &str, name: &str| {
                add(
                    &mut graph,
                    &mut env,
                    Node::builder(NodeKind::ToDenseMatrix)
                        .with_input(input, from)
                        .with_output(name, ValueType::dense_matrix()),
                )
            };
            let m1 = dense(x1, "x1", "m1");
            let m2 = dense(x2, "x2", "m2");
            let stacked = add(
                &mut graph,
                &mut env,
                Node::builder(NodeKind::StackDense)
                    .with_input(m1, "m1")
                    .with_input(m2, "m2")
                    .with_output("stacked", ValueType::dense_matrix()),
            );
            add(
                &mut graph,
                &mut env,
                Node::builder(NodeKind::Identity)
                    .with_input(stacked, "stacked")
                    .with_output("features", ValueType::dense_matrix()),
            )
        }
        TableFeatures::FrameConcat => add(
            &mut graph,
            &mut env,
            Node::builder(NodeKind::Concat {
                shape: TableShape::Frame,
            })
            .with_input(x1, "x1")
            .with_input(x2, "x2")
            .with_output(
                "features",
                ValueType::Frame(FrameType::doubles(["x1", "x2"]).unwrap()),
            ),
        ),
        TableFeatures::ColumnSet => {
            let columns = |names: [&str; 2]| {
                ValueType::ColumnSet(ColumnSetType::new(double.clone(), names))
            };
            let concat = add(
                &mut graph,
                &mut env,
                Node::builder(NodeKind::Concat {
                    shape: TableShape::ColumnSet,
                })
                .with_input(x1, "x1")
                .with_input(x2, "x2")
                .with_output("columns", columns(["x1", "x2"])),
            );
            let picked = add(
                &mut graph,
                &mut env,
                Node::builder(NodeKind::ColumnSelect {
                    shape: TableShape::ColumnSet,
                    columns: vec!["x2".to_owned(), "x1".to_owned()],
                })
                .with_input(concat, "columns")
                .with_output("picked", columns(["x2", "x1"])),
            );
            add(
                &mut graph,
                &mut env,
                Node::builder(NodeKind::Reshape { dims: vec![-1, 2] })
                    .with_input(picked, "picked")
                    .with_output("features", ValueType::dense_matrix()),
            )
        }
    };
    let inputs = ModelInputs::new([
        (x1, InputSlot::Range { start: 0, end: 1 }),
        (x2, InputSlot::Range { start: 1, end: 2 }),
    ]);
    let (labels, model, output) = add_model(&mut graph, &mut env, op, features, inputs);
    let plan = insertion_order(&graph);

    TablePipeline {
        graph,
        env,
        plan,
        df,
        labels,
        x1,
        x2,
        features,
        model,
        output,
    }
}

/// Table pipeline cost annotation: only `x2` costs anything.
pub fn table_config() -> CascadeConfig {
    CascadeConfig::builder()
        .with_costly_statements(vec!["x2".to_owned()])
        .with_costly_statement_cost(4.0)
        .build()
        .unwrap()
}

/// Frame pipeline cost annotation: the glue score is the expensive part.
pub fn frame_config() -> CascadeConfig {
    CascadeConfig::builder()
        .with_costly_statements(vec!["extra".to_owned()])
        .with_costly_statement_cost(4.0)
        .build()
        .unwrap()
}

/// Adds an impure glue block reading the raw frame.
pub fn impure_glue(pipeline: &mut FramePipeline) -> NodeId {
    let ty = ValueType::Frame(FrameType::doubles(["remote_score"]).unwrap());
    add(
        &mut pipeline.graph,
        &mut pipeline.env,
        Node::builder(NodeKind::Glue(GlueBlock::new("remote = fetch(df)", false)))
            .with_input(pipeline.df, "df")
            .with_output("remote", ty),
    )
}

/// Adds a standalone threshold gate.
pub fn gate_node(graph: &mut Graph, env: &mut TypeEnv) -> RowGate {
    let probabilities = add(
        graph,
        env,
        Node::builder(NodeKind::Input).with_output("gate_probabilities", ValueType::doubles()),
    );
    let node = add(
        graph,
        env,
        Node::builder(NodeKind::ThresholdGate {
            threshold: 0.8,
            policy: ThresholdPolicy::SingleSided,
            report_probability: false,
        })
        .with_input(probabilities, "gate_probabilities")
        .with_output("gate_preds", ValueType::doubles())
        .with_output("gate_mask", ValueType::mask()),
    );
    RowGate {
        node,
        mask: "gate_mask".to_owned(),
    }
}

fn model_inputs(graph: &Graph, model: NodeId) -> ModelInputs {
    graph
        .node(model)
        .unwrap()
        .kind()
        .as_model()
        .unwrap()
        .inputs
        .clone()
}

fn scored(
    graph: &Graph,
    model: NodeId,
    config: &CascadeConfig,
    importances: &[f64],
) -> CascadeArtifact {
    let inputs = model_inputs(graph, model);
    let importances: FeatureScores = inputs
        .groups()
        .zip(importances)
        .map(|((_, indices), importance)| (indices, *importance))
        .collect();
    let costs = CostModel::new(config)
        .indices_to_costs(graph, &inputs)
        .unwrap();
    let mut artifact = CascadeArtifact::new();
    artifact.record_scores(importances, costs, config.budget_fraction);
    artifact
}

fn with_models(mut artifact: CascadeArtifact) -> CascadeArtifact {
    artifact.store_model(ModelSlot::BigModel, json!({ "model": BIG_MODEL }));
    artifact.store_model(ModelSlot::SmallModel, json!({ "model": SMALL_MODEL }));
    artifact
}

/// Text pipeline scores without trained models.
pub fn text_scores() -> CascadeArtifact {
    let pipeline = text_pipeline(ModelOp::Predict);
    scored(
        &pipeline.graph,
        pipeline.model,
        &CascadeConfig::default(),
        &[0.5, 0.3, 0.2],
    )
}

/// Text pipeline artifact splitting title and description from chars.
pub fn text_artifact() -> CascadeArtifact {
    with_models(text_scores())
}

/// Text pipeline artifact in which no group matters.
pub fn flat_text_artifact() -> CascadeArtifact {
    let pipeline = text_pipeline(ModelOp::Predict);
    with_models(scored(
        &pipeline.graph,
        pipeline.model,
        &CascadeConfig::default(),
        &[0.0, 0.0, 0.0],
    ))
}

/// Frame pipeline artifact leaving only the glue score to the big model.
pub fn frame_artifact() -> CascadeArtifact {
    let pipeline = frame_pipeline(ModelOp::Predict);
    with_models(scored(
        &pipeline.graph,
        pipeline.model,
        &frame_config(),
        &[0.01, 0.4, 0.3, 0.2],
    ))
}

/// Table pipeline artifact leaving `x2` to the big model.
pub fn table_artifact(shape: TableFeatures) -> CascadeArtifact {
    let pipeline = table_pipeline(ModelOp::Predict, shape);
    with_models(scored(
        &pipeline.graph,
        pipeline.model,
        &table_config(),
        &[0.5, 0.3],
    ))
}

/// Forty dense rows labelled by `x1`; `x2` is always zero.
pub fn table_training_data() -> TrainingData {
    let rows: Vec<Vec<f64>> = (0..40).map(|row| vec![row as f64, 0.0]).collect();
    let y = (0..40).map(|row| row as f64).collect();
    TrainingData::new(DenseMatrix::from_rows(&rows).unwrap(), y).unwrap()
}

/// Forty rows whose label is the first column; the rest is zero.
pub fn text_training_data() -> TrainingData {
    let rows: Vec<Vec<f64>> = (0..40)
        .map(|row| {
            let mut values = vec![0.0; 30];
            values[0] = row as f64;
            values
        })
        .collect();
    let y = (0..40).map(|row| row as f64).collect();
    let dense = DenseMatrix::from_rows(&rows).unwrap();
    TrainingData::new(CsrMatrix::from_dense(&dense), y).unwrap()
}

fn accuracy(y: &[f64], predictions: &[f64]) -> f64 {
    let hits = y.iter().zip(predictions).filter(|(a, b)| a == b).count();
    hits as f64 / y.len() as f64
}

/// Predicts the first column.
#[derive(Debug, Default)]
pub struct FirstColumnTrainer;

impl CascadeTrainer for FirstColumnTrainer {
    type Model = ();

    fn train(&self, _x: &FeatureMatrix, _y: &[f64]) -> Result<(), BoxedError> {
        Ok(())
    }

    fn predict(&self, _model: &(), x: &FeatureMatrix) -> Result<Vec<f64>, BoxedError> {
        Ok(x.to_dense().as_array().column(0).to_vec())
    }

    fn score(&self, y: &[f64], predictions: &[f64]) -> Result<f64, BoxedError> {
        Ok(accuracy(y, predictions))
    }
}

/// Ignores its features entirely.
#[derive(Debug, Default)]
pub struct UniformTrainer;

impl CascadeTrainer for UniformTrainer {
    type Model = ();

    fn train(&self, _x: &FeatureMatrix, _y: &[f64]) -> Result<(), BoxedError> {
        Ok(())
    }

    fn predict(&self, _model: &(), x: &FeatureMatrix) -> Result<Vec<f64>, BoxedError> {
        Ok(vec![0.0; x.n_rows()])
    }

    fn score(&self, y: &[f64], predictions: &[f64]) -> Result<f64, BoxedError> {
        Ok(accuracy(y, predictions))
    }
}

/// Tracks row counts through a plan and records what it evaluated.
///
/// The small model returns fixed probabilities; the big model predicts
/// [`BIG_MODEL_PREDICTION`] for every row it receives. Any other node passes
/// on the row count of its first input, or the number of unresolved rows
/// when it reads a gate mask.
#[derive(Debug)]
pub struct MockEvaluator {
    probabilities: Vec<f64>,
    pub big_model_rows: Vec<usize>,
    pub evaluated: Vec<NodeId>,
}

impl MockEvaluator {
    pub fn new(probabilities: Vec<f64>) -> Self {
        Self {
            probabilities,
            big_model_rows: Vec::new(),
            evaluated: Vec::new(),
        }
    }
}

fn row_count(value: &Value) -> usize {
    match value {
        Value::Floats(values) => values.len(),
        Value::Mask(values) => values.len(),
        Value::Opaque(value) => value
            .as_array()
            .map(Vec::len)
            .or_else(|| value["rows"].as_u64().map(|rows| rows as usize))
            .unwrap_or(0),
    }
}

impl NodeEvaluator for MockEvaluator {
    fn evaluate(
        &mut self,
        id: NodeId,
        node: &Node,
        inputs: &[&Value],
    ) -> Result<Vec<Value>, BoxedError> {
        self.evaluated.push(id);
        let unresolved = inputs
            .iter()
            .find_map(|value| value.as_mask())
            .map(|mask| mask.iter().filter(|resolved| !**resolved).count());
        let rows = unresolved
            .unwrap_or_else(|| inputs.first().map_or(0, |value| row_count(value)));

        match node.kind() {
            NodeKind::Model(model) if model.model == SMALL_MODEL => {
                Ok(vec![Value::Floats(self.probabilities.clone())])
            }
            NodeKind::Model(model) => {
                if model.model == BIG_MODEL {
                    self.big_model_rows.push(rows);
                }
                Ok(vec![Value::Floats(vec![BIG_MODEL_PREDICTION; rows])])
            }
            _ => Ok(node
                .outputs()
                .iter()
                .map(|_| Value::Opaque(json!({ "rows": rows })))
                .collect()),
        }
    }
}

/// Asserts every name a node in `plan` reads is bound by an earlier node.
pub fn assert_reads_are_bound(graph: &Graph, plan: &[NodeId]) {
    let mut bound = std::collections::HashSet::new();
    for &id in plan {
        let node = graph.node(id).unwrap();
        for name in node.input_names() {
            assert!(bound.contains(name), "{id} reads `{name}` before it is bound");
        }
        bound.extend(node.output_names().map(str::to_owned));
    }
}
