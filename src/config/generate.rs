pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# FOOTFALL CONFIGURATION
# =============================================================================
# Footfall reads video (a live stream, a stream processor's results, or local
# files), sends it to a face-analysis service and stores visitor analytics.
#
# Each command uses the sections it needs:
#
#   footfall stream      stream + services.video + services.vision
#   footfall processor   processor + services.vision
#   footfall batch       batch + services.vision (+ services.objects)
#   footfall push        services.video (+ push, services.objects)
#   footfall serve       web
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/footfall/config.yml
#   3. /etc/footfall/config.yml
#
# Any value may reference environment variables with $env{NAME}.

# =============================================================================
# STORAGE
# =============================================================================
# Local DuckDB file holding cursors, analytics records and visitor records.

storage:
  path: ~/.local/share/footfall/footfall.duckdb
  tables:
    cursors: StreamMetadataTable
    analytics: BoothAnalyticsTable
    visitors: VisitorTracking

# =============================================================================
# SERVICES
# =============================================================================
# HTTP gateways in front of the managed services.

services:
  video:
    url: http://localhost:4566/video
    timeout: 30s
  vision:
    url: http://localhost:4566/vision
    timeout: 30s
  # Only needed when batch sources list objects or 'push' uploads an object.
  objects:
    type: http
    url: http://localhost:4566/objects
    timeout: 5m

# =============================================================================
# STREAM
# =============================================================================
# Polls a video stream for fragments and analyses each one. Resumes strictly
# after the last fragment whose analytics were stored, unless start_timestamp
# is set.

stream:
  name: video-stream-1
  # start_timestamp: 2024-05-01T10:00:00Z
  list_limit: 5
  read_limit: 10
  poll_interval: 5s
  analysis:
    # 'fire_and_poll' submits a job and polls it; 'synchronous' waits inline
    mode: fire_and_poll
    poll_interval: 10s
    max_polls: 30

# =============================================================================
# PROCESSOR
# =============================================================================
# Reads results from a long-running stream processor instead of submitting
# fragments one by one.

processor:
  name: booth-face-processor
  stream: video-stream-1
  poll_interval: 5s

# =============================================================================
# BATCH
# =============================================================================
# Processes local files once. Files already recorded in the checkpoint are
# skipped; files that fail are retried on the next run.

batch:
  sample_interval: 10s
  # 'random' assigns a fresh visitor id per analysed frame; 'stable' derives
  # it from the face id reported by the vision service.
  visitor_identity: random
  sources:
    videos:
      path: ./videos
      kind: video
      extensions: [mkv]
      # objects:
      #   - bucket: booth-videos
      #     key: video1.mkv
    images:
      path: ./images
      kind: image
      extensions: [jpg]

# =============================================================================
# PUSH
# =============================================================================
# Uploads a recorded video into the stream, one chunk per request. The target
# stream defaults to stream.name.

push:
  chunk_size: 1048576
  chunk_pause: 100ms

# =============================================================================
# WEB
# =============================================================================

web:
  listen: 0.0.0.0:5000
"#
    .to_string()
}
