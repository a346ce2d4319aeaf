//! JSON Schema (draft-04) parameter definitions for the function tools

use serde_json::{json, Value};

use super::ToolKey;

const DRAFT_04: &str = "http://json-schema.org/draft-04/schema#";

pub fn parameters(key: ToolKey) -> Value {
    match key {
        ToolKey::SearchTracks => json!({
            "$schema": DRAFT_04,
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query for the track."
                },
                "type": {
                    "type": "string",
                    "description": "What to search for. Possible values are: track, album, artist. Defaults to track."
                }
            },
            "required": ["query"]
        }),
        ToolKey::ControlPlayback => json!({
            "$schema": DRAFT_04,
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "description": "The action to perform on the track. Possible values are: play, pause, resume, next, previous."
                },
                "uri": {
                    "type": "string",
                    "description": "The URI of the track to perform the action on. Required for play action."
                }
            },
            "required": ["action"]
        }),
        ToolKey::GetTopTracks => json!({
            "$schema": DRAFT_04,
            "type": "object",
            "properties": {
                "timeRange": {
                    "type": "string",
                    "description": "The time range for the top tracks. Possible values are: short_term, medium_term, long_term."
                }
            },
            "required": []
        }),
        ToolKey::GetRecentTracks => json!({
            "$schema": DRAFT_04,
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "description": "How many recently played tracks to return, from 1 to 50. Defaults to 20."
                }
            },
            "required": []
        }),
        ToolKey::GetPlaylistTracks => json!({
            "$schema": DRAFT_04,
            "type": "object",
            "properties": {
                "playlistId": {
                    "type": "string",
                    "description": "The ID, URI or link of the playlist."
                }
            },
            "required": ["playlistId"]
        }),
        ToolKey::GetCurrentTrack | ToolKey::GetPlaylists => json!({
            "$schema": DRAFT_04,
            "type": "object",
            "properties": {},
            "required": []
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_parameters_are_declared() {
        for key in ToolKey::ALL {
            let schema = parameters(key);
            assert_eq!(schema["$schema"], DRAFT_04);
            let props = schema["properties"].as_object().unwrap();
            for required in schema["required"].as_array().unwrap() {
                assert!(props.contains_key(required.as_str().unwrap()), "{:?}", key);
            }
        }
    }
}
