mod message_id;
