// ---------------------------------------------------------------------------
// RecommenderServer — JSON-RPC dispatcher
// ---------------------------------------------------------------------------
//
// Routes incoming JSON-RPC 2.0 requests (NDJSON over stdin) to the engine.
// A session is opened by `engine/initialize`: it loads the store, then caches
// the rating matrix and user averages for every later call.
// ---------------------------------------------------------------------------

use std::io::{self, BufRead};
use std::path::PathBuf;

use serde::Deserialize;

use crate::config::EngineConfig;
use crate::driver;
use crate::error::RecommenderError;
use crate::protocol::*;
use crate::recommender::Recommender;
use crate::store::{MemoryStore, RatingStore};
use crate::transport::NdjsonTransport;
use crate::types::{
	ItemId, KnownPrediction, PredictionMethod, PredictionTable, RatingMatrix, UserAverages, UserId,
};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct Session {
	engine: Recommender<MemoryStore>,
	ratings: RatingMatrix,
	averages: UserAverages,
	commit_every: usize,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// JSON-RPC server over a [`MemoryStore`]-backed [`Recommender`].
pub struct RecommenderServer {
	transport: NdjsonTransport,
	config: EngineConfig,
	session: Option<Session>,
}

impl RecommenderServer {
	/// Create a server. No store is loaded until `engine/initialize`.
	pub fn new(transport: NdjsonTransport, config: EngineConfig) -> Self {
		Self {
			transport,
			config,
			session: None,
		}
	}

	/// Main loop: read JSON-RPC messages from stdin, dispatch to handlers.
	/// When input ends, or can no longer be read, the session's store is
	/// saved if dirty.
	pub fn run(&mut self) -> Result<(), RecommenderError> {
		let stdin = io::stdin();
		let reader = stdin.lock();

		for chunk in reader.split(b'\n') {
			let bytes = match chunk {
				Ok(bytes) => bytes,
				Err(e) => {
					tracing::error!("Failed to read stdin: {}", e);
					break;
				}
			};
			let Ok(line) = std::str::from_utf8(&bytes) else {
				tracing::warn!("Discarding non-UTF-8 input line");
				self.transport
					.write_error(0, PARSE_ERROR, "Parse error: invalid UTF-8", None);
				continue;
			};
			let trimmed = line.trim();
			if trimmed.is_empty() {
				continue;
			}
			self.handle_line(trimmed);
		}

		self.close_session();
		Ok(())
	}

	fn handle_line(&mut self, line: &str) {
		let value: serde_json::Value = match serde_json::from_str(line) {
			Ok(v) => v,
			Err(e) => {
				tracing::warn!("Failed to parse request: {}", e);
				self.transport
					.write_error(0, PARSE_ERROR, "Parse error: invalid JSON", None);
				return;
			}
		};

		// Notification: no reply, whatever the outcome.
		if value.get("id").is_none() {
			if let Some(method) = value.get("method").and_then(|m| m.as_str()) {
				let params = value.get("params").cloned().unwrap_or_default();
				if let Err(e) = self.call(method, params) {
					tracing::warn!(method, "Notification failed: {:?}", e);
				}
				return;
			}
		}

		let id = value.get("id").and_then(|v| v.as_u64()).unwrap_or(0);
		match serde_json::from_value::<JsonRpcRequest>(value) {
			Ok(request) => self.dispatch(request),
			Err(e) => {
				tracing::warn!("Invalid request: {}", e);
				self.transport.write_error(
					id,
					INVALID_REQUEST,
					format!("Invalid request: {}", e),
					None,
				);
			}
		}
	}

	/// Save and drop the current session, if any.
	fn close_session(&mut self) {
		if let Some(mut session) = self.session.take() {
			if let Err(e) = session.engine.store_mut().dispose() {
				tracing::error!("Failed to save store on shutdown: {}", e);
			}
		}
	}

	fn dispatch(&mut self, req: JsonRpcRequest) {
		let id = req.id;
		match self.call(&req.method, req.params) {
			Ok(value) => self.transport.write_response(id, value),
			Err(CallError::UnknownMethod) => self.transport.write_error(
				id,
				METHOD_NOT_FOUND,
				format!("Unknown method: {}", req.method),
				None,
			),
			Err(CallError::Engine(e)) => {
				let code = match &e {
					RecommenderError::Serialization(_) => INVALID_PARAMS,
					_ => RECOMMENDER_ERROR,
				};
				self.transport
					.write_error(id, code, e.to_string(), Some(e.to_json_rpc_error()));
			}
		}
	}

	/// Run a single method and return its JSON result.
	pub fn call(
		&mut self,
		method: &str,
		params: serde_json::Value,
	) -> Result<serde_json::Value, CallError> {
		let result = match method {
			// -- Lifecycle -----------------------------------------------
			"engine/initialize" => self.handle_initialize(params),
			"store/save" => self.with_session(|s| {
				s.engine.store_mut().save()?;
				Ok(serde_json::json!({}))
			}),
			"store/dispose" => self.with_session(|s| {
				s.engine.store_mut().dispose()?;
				Ok(serde_json::json!({}))
			}),
			"store/stats" => self.with_session(|s| {
				Ok(serde_json::json!({ "stats": s.engine.store().stats() }))
			}),

			// -- Ratings -------------------------------------------------
			"ratings/add" => self.with_session(|s| handle_add_rating(s, params)),

			// -- Similarity ----------------------------------------------
			"similarity/get" => self.with_session(|s| handle_similarity(s, params)),

			// -- Prediction ----------------------------------------------
			"prediction/basic" => {
				self.with_session(|s| handle_predict(s, PredictionMethod::Basic, params))
			}
			"prediction/adjusted" => {
				self.with_session(|s| handle_predict(s, PredictionMethod::Adjusted, params))
			}
			"prediction/request" => self.with_session(|s| handle_request_prediction(s, params)),
			"prediction/runPending" => self.with_session(|s| handle_run_pending(s, params)),
			"prediction/list" => self.with_session(|s| handle_list_predictions(s, params)),

			// -- Evaluation ----------------------------------------------
			"evaluation/mae" => self.with_session(|s| handle_mae(s, params)),

			_ => return Err(CallError::UnknownMethod),
		};

		result.map_err(CallError::Engine)
	}

	// ── Session accessor ──────────────────────────────────────────────────

	fn with_session<F>(&mut self, f: F) -> Result<serde_json::Value, RecommenderError>
	where
		F: FnOnce(&mut Session) -> Result<serde_json::Value, RecommenderError>,
	{
		match &mut self.session {
			Some(s) => f(s),
			None => Err(RecommenderError::NotInitialized),
		}
	}

	// ── Initialize ────────────────────────────────────────────────────────

	fn handle_initialize(
		&mut self,
		params: serde_json::Value,
	) -> Result<serde_json::Value, RecommenderError> {
		let p: InitializeParams = parse_params(params)?;

		// Re-initializing saves the outgoing store first; a failed save keeps
		// the current session in place.
		if let Some(session) = self.session.as_mut() {
			if let Err(e) = session.engine.store_mut().dispose() {
				tracing::warn!("Failed to save store before re-initialize: {}", e);
				return Err(e);
			}
		}

		let storage_path = p
			.storage_path
			.map(PathBuf::from)
			.or_else(|| self.config.storage_path.clone());
		let commit_every = p.commit_every.unwrap_or(self.config.commit_every);

		let store = match &storage_path {
			Some(path) => MemoryStore::open(path)?,
			None => MemoryStore::new(),
		};
		let ratings = store.load_rating_matrix()?;
		let averages = store.load_user_averages()?;
		let stats = store.stats();

		self.session = Some(Session {
			engine: Recommender::new(store),
			ratings,
			averages,
			commit_every,
		});

		tracing::info!(
			items = stats.items,
			ratings = stats.ratings,
			"Engine initialized"
		);
		Ok(serde_json::json!({ "stats": stats }))
	}
}

/// Failure of [`RecommenderServer::call`].
#[derive(Debug)]
pub enum CallError {
	UnknownMethod,
	Engine(RecommenderError),
}

// ---------------------------------------------------------------------------
// Param types
// ---------------------------------------------------------------------------

fn parse_params<T: serde::de::DeserializeOwned>(
	params: serde_json::Value,
) -> Result<T, RecommenderError> {
	// A request without params is treated as an empty object.
	let params = if params.is_null() {
		serde_json::json!({})
	} else {
		params
	};
	serde_json::from_value(params)
		.map_err(|e| RecommenderError::Serialization(format!("Invalid params: {}", e)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
	storage_path: Option<String>,
	commit_every: Option<usize>,
}

#[derive(Deserialize)]
struct RatingParams {
	user: UserId,
	item: ItemId,
	rating: i64,
}

#[derive(Deserialize)]
struct PairParams {
	item1: ItemId,
	item2: ItemId,
}

#[derive(Deserialize)]
struct UserItemParams {
	user: UserId,
	item: ItemId,
}

#[derive(Deserialize)]
struct MethodParams {
	method: PredictionMethod,
}

#[derive(Deserialize)]
struct RequestPredictionParams {
	method: PredictionMethod,
	user: UserId,
	item: ItemId,
}

#[derive(Deserialize)]
struct MaeParams {
	predictions: Option<Vec<KnownPrediction>>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn handle_add_rating(
	s: &mut Session,
	params: serde_json::Value,
) -> Result<serde_json::Value, RecommenderError> {
	let p: RatingParams = parse_params(params)?;
	s.engine.store_mut().add_rating(p.user, p.item, p.rating)?;
	s.ratings.insert(p.user, p.item, p.rating)?;
	if !s.engine.store().has_precomputed_averages() {
		s.averages = UserAverages::from_matrix(&s.ratings);
	}
	Ok(serde_json::json!({}))
}

fn handle_similarity(
	s: &mut Session,
	params: serde_json::Value,
) -> Result<serde_json::Value, RecommenderError> {
	let p: PairParams = parse_params(params)?;
	let similarity = s.engine.similarity(p.item1, p.item2, &s.ratings, &s.averages);
	Ok(serde_json::json!({ "similarity": similarity }))
}

fn handle_predict(
	s: &mut Session,
	method: PredictionMethod,
	params: serde_json::Value,
) -> Result<serde_json::Value, RecommenderError> {
	let p: UserItemParams = parse_params(params)?;
	let prediction = s
		.engine
		.predict(method, p.user, p.item, &s.ratings, &s.averages)?;
	Ok(serde_json::json!({ "prediction": prediction }))
}

fn handle_request_prediction(
	s: &mut Session,
	params: serde_json::Value,
) -> Result<serde_json::Value, RecommenderError> {
	let p: RequestPredictionParams = parse_params(params)?;
	s.engine
		.store_mut()
		.request_prediction(p.method, p.user, p.item);
	Ok(serde_json::json!({}))
}

fn handle_run_pending(
	s: &mut Session,
	params: serde_json::Value,
) -> Result<serde_json::Value, RecommenderError> {
	let p: MethodParams = parse_params(params)?;
	let summary = driver::run_pending(
		&mut s.engine,
		p.method,
		&s.ratings,
		&s.averages,
		s.commit_every,
	)?;
	serde_json::to_value(summary).map_err(|e| RecommenderError::Serialization(e.to_string()))
}

fn handle_list_predictions(
	s: &mut Session,
	params: serde_json::Value,
) -> Result<serde_json::Value, RecommenderError> {
	let p: MethodParams = parse_params(params)?;
	let predictions = s.engine.store().predictions(p.method);
	Ok(serde_json::json!({ "predictions": predictions }))
}

fn handle_mae(
	s: &mut Session,
	params: serde_json::Value,
) -> Result<serde_json::Value, RecommenderError> {
	let p: MaeParams = parse_params(params)?;
	let mae = match p.predictions {
		Some(list) => {
			let table: PredictionTable = list
				.into_iter()
				.map(|k| (k.user, k.item, k.prediction))
				.collect();
			s.engine.mean_absolute_error(&table, &s.ratings)?
		}
		None => driver::evaluate(s.engine.store(), &s.ratings)?,
	};
	Ok(serde_json::json!({ "mae": mae }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
