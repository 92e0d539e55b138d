impl World {
    /// Turns an existing entity into a path-following character. Fails for
    /// unknown entities and settings that do not validate.
    pub fn make_character(&mut self, id: EntityId, settings: CharacterSettings) -> bool {
        if !self.entities.contains_key(&id) {
            return false;
        }
        if let Err(err) = settings.validate() {
            warn!(entity = id.0, error = %err, "character_settings_rejected");
            return false;
        }
        self.movement.cancel(id);
        self.characters.insert(id, CharacterController::new(settings));
        self.play_idle(id);
        true
    }

    pub fn character(&self, id: EntityId) -> Option<&CharacterController> {
        self.characters.get(&id)
    }

    pub fn character_state(&self, id: EntityId) -> Option<CharacterState> {
        self.characters.get(&id).map(CharacterController::state)
    }

    pub fn queued_waypoints(&self, id: EntityId) -> Vec<TileCoord> {
        self.characters
            .get(&id)
            .map(|character| character.waypoints().collect())
            .unwrap_or_default()
    }

    pub fn set_wander(&mut self, id: EntityId, wander: Option<WanderSettings>) -> bool {
        match self.characters.get_mut(&id) {
            Some(character) => {
                character.settings.wander = wander;
                true
            }
            None => false,
        }
    }

    /// Plans a route to `goal` and queues it. While walking, the segment in
    /// progress is finished first and the new route starts from its end.
    /// Returns false, leaving the queue alone, when there is no path or the
    /// character is already there.
    pub fn set_destination(&mut self, id: EntityId, goal: TileCoord) -> bool {
        let planned = self.plan_route(id, goal);
        if planned {
            if let Some(character) = self.characters.get_mut(&id) {
                character.object_target = None;
            }
        }
        planned
    }

    /// Walks next to `target`: its interaction tile first, then its own tile,
    /// then its neighbours nearest first. Already standing next to it
    /// reaches it immediately.
    pub fn go_to_object(&mut self, id: EntityId, target: EntityId) -> bool {
        if id == target || !self.entities.contains_key(&target) {
            return false;
        }
        let (Some(own_tile), Some(target_tile)) = (
            self.occupancy.anchor_of(id),
            self.occupancy.anchor_of(target),
        ) else {
            return false;
        };
        match self.character_state(id) {
            None => return false,
            Some(CharacterState::Idle) if self.is_adjacent_to(id, target) => {
                self.reach_object(id, target);
                return true;
            }
            Some(_) => {}
        }

        let mut candidates = Vec::new();
        if let Some(offset) = self
            .entities
            .get(&target)
            .and_then(|entity| entity.interaction_offset())
        {
            candidates.push(target_tile.offset(offset));
        }
        candidates.push(target_tile);
        let mut neighbours: Vec<TileCoord> = self
            .offsets
            .iter()
            .map(|offset| target_tile.offset(*offset))
            .collect();
        neighbours.sort_by_key(|tile| own_tile.distance_sq(*tile));
        candidates.extend(neighbours);

        let mut tried = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if tried.contains(&candidate) {
                continue;
            }
            tried.push(candidate);
            if self.plan_route(id, candidate) {
                if let Some(character) = self.characters.get_mut(&id) {
                    character.object_target = Some(target);
                }
                debug!(entity = id.0, target = target.0, x = candidate.x, z = candidate.z, "approach_planned");
                return true;
            }
        }
        false
    }

    /// Returns a character to its idle animation once a one-shot animation
    /// (an idle variation) has finished.
    pub fn animation_ended(&mut self, id: EntityId) {
        if self.character_state(id) == Some(CharacterState::Idle) {
            self.play_idle(id);
        }
    }

    fn plan_route(&mut self, id: EntityId, goal: TileCoord) -> bool {
        let Some(anchor) = self.occupancy.anchor_of(id) else {
            return false;
        };
        let Some(head) = self.characters.get(&id).map(CharacterController::head) else {
            return false;
        };
        let start = head.unwrap_or(anchor);
        if start == goal {
            return false;
        }
        let path = self.find_path_from(id, start, goal);
        let waypoints = collapse_waypoints(&path);
        if waypoints.is_empty() {
            debug!(entity = id.0, x = goal.x, z = goal.z, "destination_unreachable");
            return false;
        }

        let Some(character) = self.characters.get_mut(&id) else {
            return false;
        };
        character.waypoints.truncate(usize::from(head.is_some()));
        character.waypoints.extend(waypoints);
        debug!(entity = id.0, waypoints = character.waypoints.len(), "route_planned");
        if head.is_none() {
            self.start_next_segment(id);
        }
        true
    }

    fn start_next_segment(&mut self, id: EntityId) {
        let projection = self.config.projection;
        let arity = self.config.facing_arity;
        let center = match self.characters.get(&id).and_then(CharacterController::head) {
            Some(next) => self.geometry().tile_center_flat(next),
            None => return,
        };
        let (Some(anchor), Some(position)) = (
            self.occupancy.anchor_of(id),
            self.entities.get(&id).map(|entity| entity.world_position()),
        ) else {
            return;
        };
        let Some(character) = self.characters.get_mut(&id) else {
            return;
        };
        let Some(next) = character.head() else {
            return;
        };
        if let Some(direction) = Direction::from_delta(anchor.delta_to(next), projection) {
            character.facing = direction.snapped(arity, projection);
        }
        character.end_variation();
        let speed = character.settings.speed;
        let animation = character.facing.walk_animation();
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.play_animation(&animation, PlaybackDirection::Forward);
        }
        self.movement.move_to(id, next, center, speed, position);
    }

    fn advance_route(&mut self, id: EntityId, tile: TileCoord) {
        let Some(character) = self.characters.get_mut(&id) else {
            return;
        };
        character.waypoints.pop_front();
        if character.head().is_some() {
            self.start_next_segment(id);
            return;
        }
        let target = character.object_target.take();
        self.play_idle(id);
        self.emit(GridEvent::DestinationReached { entity: id, tile });
        if let Some(target) = target {
            if self.is_adjacent_to(id, target) {
                self.reach_object(id, target);
            }
        }
    }

    fn abandon_route(&mut self, id: EntityId) {
        let Some(character) = self.characters.get_mut(&id) else {
            return;
        };
        if character.head().is_none() {
            return;
        }
        character.clear_route();
        self.movement.cancel(id);
        self.play_idle(id);
    }

    /// Within one movement offset of the target, on its interaction tile, or
    /// sharing its tile.
    fn is_adjacent_to(&self, id: EntityId, target: EntityId) -> bool {
        let (Some(own_tile), Some(target_tile)) = (
            self.occupancy.anchor_of(id),
            self.occupancy.anchor_of(target),
        ) else {
            return false;
        };
        let delta = target_tile.delta_to(own_tile);
        let interaction = self
            .entities
            .get(&target)
            .and_then(|entity| entity.interaction_offset());
        delta == TileCoord::ORIGIN || self.offsets.contains(&delta) || interaction == Some(delta)
    }

    fn reach_object(&mut self, id: EntityId, target: EntityId) {
        let projection = self.config.projection;
        let arity = self.config.facing_arity;
        if let (Some(own_tile), Some(target_tile), Some(character)) = (
            self.occupancy.anchor_of(id),
            self.occupancy.anchor_of(target),
            self.characters.get_mut(&id),
        ) {
            if let Some(direction) = Direction::from_delta(own_tile.delta_to(target_tile), projection)
            {
                character.facing = direction.snapped(arity, projection);
            }
        }
        self.play_idle(id);
        self.emit(GridEvent::ObjectReached { entity: id, target });
    }

    fn play_idle(&mut self, id: EntityId) {
        let Some(character) = self.characters.get_mut(&id) else {
            return;
        };
        character.end_variation();
        let animation = character.facing.idle_animation();
        if let Some(entity) = self.entities.get_mut(&id) {
            if !entity.is_current_animation(&animation) {
                entity.play_animation(&animation, PlaybackDirection::Forward);
            }
        }
    }

    /// Per-tick idle rolls: wander first, then idle variations.
    fn update_idle_characters(&mut self) {
        let ids: Vec<EntityId> = self.characters.keys().copied().collect();
        for id in ids {
            if self.movement.is_moving(id) || !self.occupancy.contains(id) {
                continue;
            }
            let Some(character) = self.characters.get(&id) else {
                continue;
            };
            if character.state() != CharacterState::Idle {
                continue;
            }
            let wander = character.settings.wander;
            let variation_chance = character.settings.variation_probability;
            let variation_count = character.settings.idle_variations.len();
            let can_vary = variation_count > 0 && !character.is_playing_variation();

            if let Some(wander) = wander {
                if self.rng.random_bool(wander.probability.clamp(0.0, 1.0))
                    && self.wander_step(id, wander)
                {
                    continue;
                }
            }
            if can_vary && self.rng.random_bool(variation_chance.clamp(0.0, 1.0)) {
                let index = self.rng.random_range(0..variation_count);
                self.play_variation(id, index);
            }
        }
    }

    fn play_variation(&mut self, id: EntityId, index: usize) {
        let Some(character) = self.characters.get_mut(&id) else {
            return;
        };
        let Some(name) = character.settings.idle_variations.get(index).cloned() else {
            return;
        };
        let playback = character.take_variation_playback();
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.play_animation(&name, playback);
        }
    }

    /// Picks a random nearby tile and tries to walk there, dropping one axis
    /// of the offset at a time when the full offset has no route.
    fn wander_step(&mut self, id: EntityId, wander: WanderSettings) -> bool {
        let radius = wander.step_radius.max(0);
        let Some(own_tile) = self.occupancy.anchor_of(id) else {
            return false;
        };
        if radius == 0 {
            return false;
        }
        let mut dx = self.rng.random_range(-radius..=radius);
        let mut dz = self.rng.random_range(-radius..=radius);
        if let Some(target_tile) = wander.target.and_then(|target| self.occupancy.anchor_of(target)) {
            dx = lean_toward(dx, target_tile.x - own_tile.x);
            dz = lean_toward(dz, target_tile.z - own_tile.z);
        }

        let attempts = [
            TileCoord::new(dx, dz),
            TileCoord::new(dx, 0),
            TileCoord::new(0, dz),
        ];
        let mut tried = Vec::with_capacity(attempts.len());
        for offset in attempts {
            if offset == TileCoord::ORIGIN || tried.contains(&offset) {
                continue;
            }
            tried.push(offset);
            if self.set_destination(id, own_tile.offset(offset)) {
                return true;
            }
        }
        false
    }
}

fn lean_toward(step: i32, toward: i32) -> i32 {
    if toward == 0 {
        step
    } else {
        step.abs() * toward.signum()
    }
}
